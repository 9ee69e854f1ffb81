//! Rule-based CRM opportunity-stage suggestions.
//!
//! Keyword groups are evaluated in order over the lowercased summary
//! text; the first matching group wins. Each group maps to the stage
//! names the three supported CRMs use.

/// Stage names per CRM system for one pipeline position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageSet {
    pub salesforce: &'static str,
    pub hubspot: &'static str,
    pub creatio: &'static str,
}

impl StageSet {
    pub fn for_system(&self, system: &str) -> Option<&'static str> {
        match system {
            "salesforce" => Some(self.salesforce),
            "hubspot" => Some(self.hubspot),
            "creatio" => Some(self.creatio),
            _ => None,
        }
    }
}

const CLOSING: StageSet = StageSet {
    salesforce: "Closed Won",
    hubspot: "closedwon",
    creatio: "Won",
};
const PROPOSAL: StageSet = StageSet {
    salesforce: "Proposal/Price Quote",
    hubspot: "presentationscheduled",
    creatio: "Proposal",
};
const NEGOTIATION: StageSet = StageSet {
    salesforce: "Negotiation/Review",
    hubspot: "decisionmakerboughtin",
    creatio: "Negotiation",
};
const QUALIFICATION: StageSet = StageSet {
    salesforce: "Needs Analysis",
    hubspot: "qualifiedtobuy",
    creatio: "Qualification",
};
const PROSPECTING: StageSet = StageSet {
    salesforce: "Prospecting",
    hubspot: "appointmentscheduled",
    creatio: "Prospecting",
};

/// Ordered rules: earlier groups take precedence.
const RULES: [(&[&str], StageSet); 4] = [
    (
        &["signed", "approved", "contract", "deal closed", "purchase order"],
        CLOSING,
    ),
    (&["proposal", "quote", "pricing", "contract review"], PROPOSAL),
    (&["negotiate", "terms", "conditions", "discount"], NEGOTIATION),
    (&["requirements", "needs", "budget", "timeline"], QUALIFICATION),
];

/// Suggest the opportunity stage for every CRM based on summary text.
pub fn suggest_stages(summary_text: &str) -> StageSet {
    let lower = summary_text.to_lowercase();
    for (keywords, stages) in RULES {
        if keywords.iter().any(|k| lower.contains(k)) {
            return stages;
        }
    }
    PROSPECTING
}
