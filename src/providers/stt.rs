//! STT client: one streaming connection per speaking turn.
//!
//! `connect_async`, then `while let Some(msg) = stream.next().await`
//! matching `Text`/`Close`/`Err`. Query parameters and event kinds are
//! fixed per the gateway's contract with the upstream provider.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::CoreError;

/// One event surfaced from the STT provider to the Session.
#[derive(Debug, Clone)]
pub enum SttEvent {
    Partial { text: String },
    Final { text: String, confidence: Option<f64> },
    UtteranceEnd,
}

/// A live STT stream: bytes are pushed in, events come out on the channel
/// returned alongside the handle.
#[async_trait]
pub trait SttStream: Send {
    async fn send_audio(&mut self, pcm16: &[u8]) -> Result<(), CoreError>;
    async fn close(&mut self);
}

#[async_trait]
pub trait SttClient: Send + Sync {
    async fn open_stream(
        &self,
        sample_rate: u32,
    ) -> Result<(Box<dyn SttStream>, mpsc::Receiver<SttEvent>), CoreError>;
}

pub struct DeepgramSttClient {
    api_key: String,
}

impl DeepgramSttClient {
    pub fn new(config: &Config) -> Self {
        Self { api_key: config.deepgram_api_key.clone() }
    }

    fn url(&self, sample_rate: u32) -> String {
        format!(
            "wss://api.deepgram.com/v1/listen?encoding=linear16&sample_rate={sample_rate}\
             &channels=1&interim_results=true&smart_format=true&punctuate=true\
             &filler_words=true&utterance_end_ms=1500&endpointing=500"
        )
    }
}

struct WsSttStream {
    sink: futures_util::stream::SplitSink<
        tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
        WsMessage,
    >,
}

#[async_trait]
impl SttStream for WsSttStream {
    async fn send_audio(&mut self, pcm16: &[u8]) -> Result<(), CoreError> {
        self.sink
            .send(WsMessage::Binary(pcm16.to_vec().into()))
            .await
            .map_err(|e| CoreError::ProviderUnavailable(format!("STT send failed: {e}")))
    }

    async fn close(&mut self) {
        let _ = self.sink.close().await;
    }
}

#[async_trait]
impl SttClient for DeepgramSttClient {
    async fn open_stream(
        &self,
        sample_rate: u32,
    ) -> Result<(Box<dyn SttStream>, mpsc::Receiver<SttEvent>), CoreError> {
        let url = self.url(sample_rate);
        let mut request = url
            .clone()
            .into_client_request()
            .map_err(|e| CoreError::ProviderUnavailable(format!("invalid STT URL: {e}")))?;
        request.headers_mut().insert(
            "Authorization",
            format!("Token {}", self.api_key)
                .parse()
                .map_err(|_| CoreError::ProviderUnavailable("invalid STT auth header".into()))?,
        );

        let (ws_stream, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| CoreError::ProviderUnavailable(format!("STT connect failed: {e}")))?;
        let (sink, mut source) = ws_stream.split();

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            while let Some(msg) = source.next().await {
                match msg {
                    Ok(WsMessage::Text(text)) => {
                        match parse_provider_frame(&text) {
                            Some(event) => {
                                if tx.send(event).await.is_err() {
                                    break;
                                }
                            }
                            None => debug!("STT: skipped unrecognized frame"),
                        }
                    }
                    Ok(WsMessage::Close(_)) => break,
                    Err(e) => {
                        warn!("STT socket error: {e}");
                        break;
                    }
                    _ => {}
                }
            }
        });

        Ok((Box::new(WsSttStream { sink }), rx))
    }
}

use tokio_tungstenite::tungstenite::client::IntoClientRequest;

/// Parses one provider text frame into an `SttEvent`, tolerating unknown or
/// malformed shapes by returning `None` (log-and-skip, never fails the
/// stream).
fn parse_provider_frame(raw: &str) -> Option<SttEvent> {
    let value: serde_json::Value = serde_json::from_str(raw).ok()?;
    let kind = value.get("type")?.as_str()?;
    match kind {
        "UtteranceEnd" => Some(SttEvent::UtteranceEnd),
        "Results" => {
            let alt = value
                .get("channel")?
                .get("alternatives")?
                .as_array()?
                .first()?;
            let text = alt.get("transcript")?.as_str()?.trim().to_string();
            if text.is_empty() {
                return None;
            }
            let is_final = value.get("is_final").and_then(|v| v.as_bool()).unwrap_or(false);
            if is_final {
                let confidence = alt
                    .get("words")
                    .and_then(|w| w.as_array())
                    .filter(|words| !words.is_empty())
                    .map(|words| {
                        let sum: f64 = words
                            .iter()
                            .filter_map(|w| w.get("confidence").and_then(|c| c.as_f64()))
                            .sum();
                        sum / words.len() as f64
                    });
                Some(SttEvent::Final { text, confidence })
            } else {
                Some(SttEvent::Partial { text })
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_utterance_end() {
        let frame = r#"{"type":"UtteranceEnd"}"#;
        assert!(matches!(parse_provider_frame(frame), Some(SttEvent::UtteranceEnd)));
    }

    #[test]
    fn parses_final_with_mean_confidence() {
        let frame = r#"{
            "type":"Results","is_final":true,
            "channel":{"alternatives":[{
                "transcript":"hi there",
                "words":[{"confidence":0.8},{"confidence":1.0}]
            }]}
        }"#;
        match parse_provider_frame(frame) {
            Some(SttEvent::Final { text, confidence }) => {
                assert_eq!(text, "hi there");
                assert!((confidence.unwrap() - 0.9).abs() < 1e-9);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn parses_partial() {
        let frame = r#"{
            "type":"Results","is_final":false,
            "channel":{"alternatives":[{"transcript":"hi","words":[]}]}
        }"#;
        assert!(matches!(parse_provider_frame(frame), Some(SttEvent::Partial { .. })));
    }

    #[test]
    fn empty_transcript_yields_nothing() {
        let frame = r#"{
            "type":"Results","is_final":false,
            "channel":{"alternatives":[{"transcript":"  ","words":[]}]}
        }"#;
        assert!(parse_provider_frame(frame).is_none());
    }

    #[test]
    fn malformed_frame_is_skipped_not_errored() {
        assert!(parse_provider_frame("not json at all").is_none());
        assert!(parse_provider_frame(r#"{"type":"SomethingElse"}"#).is_none());
    }
}
