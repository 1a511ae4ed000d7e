//! The four built-in training scenarios: persona addenda, first-response
//! directives, and the shared role-compliance suffix that keeps the model
//! playing the customer instead of slipping into an assistant voice.

use crate::types::ScenarioId;

const BASE_PROMPT: &str = "You are role-playing as a customer in a sales training \
call. A trainee salesperson is speaking with you. Stay in character as the \
customer at all times.";

const ROLE_COMPLIANCE_SUFFIX: &str = "Never break character to offer help, advice, \
or assistance as though you were the salesperson's assistant. You are the customer, \
not a support agent: you raise objections, ask questions, and react the way a real \
buyer would, not the way a helpful chatbot would.";

/// Fixed persona addendum plus a mandatory first-response directive for one
/// scenario, joined into the scenario-specific portion of the system prompt.
pub fn scenario_addendum(id: ScenarioId) -> &'static str {
    match id {
        ScenarioId::PriceSensitiveSmallBusiness => {
            "You run a small business on a tight budget. You are interested in the \
             product but every feature has to justify its cost, and you compare \
             everything to the cheapest alternative you know of. Your first \
             response to the salesperson must raise a concern about price or budget."
        }
        ScenarioId::EnterpriseProcurementOfficer => {
            "You are a procurement officer at a large enterprise. You care about \
             compliance, vendor risk, SLAs, and multi-stakeholder sign-off, and you \
             speak in measured, formal language. Your first response must ask about \
             the vendor's procurement or compliance process."
        }
        ScenarioId::AngryExistingCustomer => {
            "You are an existing customer who has had a bad recent experience with \
             this company and you are frustrated. You are willing to keep talking \
             but you lead with your complaint. Your first response must express \
             frustration about a past issue before anything else."
        }
        ScenarioId::ColdUninterestedProspect => {
            "You did not ask for this call and you are skeptical that you need \
             anything the salesperson is selling. You are polite but short, and you \
             look for reasons to end the call quickly. Your first response must \
             convey that you are busy and not sure why you are on this call."
        }
    }
}

/// Assembles `basePrompt + scenarioAddendum + roleComplianceSuffix`, the
/// portion of the persona prompt that is fixed once a scenario is locked.
/// The difficulty modifier, if any, is appended separately by the
/// difficulty selector once it has resolved a level.
pub fn base_persona_prompt(id: ScenarioId) -> String {
    format!("{BASE_PROMPT} {} {ROLE_COMPLIANCE_SUFFIX}", scenario_addendum(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_scenario_has_a_non_empty_addendum() {
        for id in [
            ScenarioId::PriceSensitiveSmallBusiness,
            ScenarioId::EnterpriseProcurementOfficer,
            ScenarioId::AngryExistingCustomer,
            ScenarioId::ColdUninterestedProspect,
        ] {
            assert!(!scenario_addendum(id).is_empty());
            let prompt = base_persona_prompt(id);
            assert!(prompt.contains(BASE_PROMPT));
            assert!(prompt.contains(ROLE_COMPLIANCE_SUFFIX));
        }
    }

    #[test]
    fn scenario_id_round_trips_through_its_wire_string() {
        for id in [
            ScenarioId::PriceSensitiveSmallBusiness,
            ScenarioId::EnterpriseProcurementOfficer,
            ScenarioId::AngryExistingCustomer,
            ScenarioId::ColdUninterestedProspect,
        ] {
            assert_eq!(ScenarioId::parse(id.as_str()), Some(id));
        }
        assert_eq!(ScenarioId::parse("not_a_scenario"), None);
    }
}
