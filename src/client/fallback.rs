//! Canned answers used when the query service cannot be reached.

const GREETING: &str = "Hello! I'm the Copilot AI agent. I can help you with information security \
assessments, compliance frameworks, and risk management. How can I assist you today?\n\n\
[Mock Response - Start API server for full functionality]";

const DOMAIN: &str = "IP2M METRR (Information Protection Maturity Model - Maturity Evaluation and \
Risk Rating) is a framework for assessing organizational information security maturity. It \
provides structured evaluation criteria across governance, risk management, and technical \
controls.\n\n[Mock Response - Confidence: 0.85]";

const SECURITY: &str = "Information security protects digital assets through technical controls, \
policies, and procedures. Key areas include:\n\n\
- Access Control & Identity Management\n\
- Data Protection & Encryption\n\
- Network Security\n\
- Incident Response\n\
- Security Awareness Training\n\n\
Would you like me to elaborate on any specific area?\n\n[Mock Response - Confidence: 0.92]";

const HELP: &str = "I can assist you with:\n\n\
- Security Framework Analysis\n\
- Risk Assessment Guidance\n\
- Compliance Requirements\n\
- Control Implementation\n\
- Maturity Model Evaluation\n\n\
To get full AI capabilities, start the API server from the Control tab.\n\n\
[Mock Response - Confidence: 0.88]";

/// Ordered keyword table; the first row with a matching keyword wins.
const RULES: &[(&[&str], &str)] = &[
    (&["hello", "hi", "hey"], GREETING),
    (&["ip2m", "metrr"], DOMAIN),
    (&["security", "cybersecurity"], SECURITY),
    (&["help", "what", "how"], HELP),
];

/// Pick a local answer for `question`. Matching is case-insensitive substring search.
pub fn fallback_answer(question: &str) -> String {
    let lowered = question.to_lowercase();
    RULES
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| lowered.contains(k)))
        .map(|(_, answer)| answer.to_string())
        .unwrap_or_else(|| generic(question))
}

fn generic(question: &str) -> String {
    format!(
        "I understand you're asking about: '{question}'\n\n\
This is a mock response since the API server is not currently running. To get \
evidence-based answers from the RAG pipeline, please:\n\n\
1. Start the API server from the Control tab\n\
2. Ensure Ollama is running with the required models\n\
3. Check that documents are indexed in the system\n\n\
[Mock Response - Please start API server]"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greeting_wins_over_later_rules() {
        assert_eq!(fallback_answer("Hello, what is IP2M?"), GREETING);
        assert_eq!(fallback_answer("HEY"), GREETING);
    }

    #[test]
    fn domain_terms() {
        assert_eq!(fallback_answer("Explain METRR scoring"), DOMAIN);
    }

    #[test]
    fn security_terms() {
        assert_eq!(fallback_answer("cybersecurity basics"), SECURITY);
    }

    #[test]
    fn help_requests() {
        assert_eq!(fallback_answer("Can you help me?"), HELP);
        assert_eq!(fallback_answer("how do I start"), HELP);
    }

    #[test]
    fn generic_quotes_the_question() {
        let answer = fallback_answer("Risk ratings for vendors");
        assert!(answer.contains("'Risk ratings for vendors'"));
        assert!(answer.contains("mock response"));
    }
}
