//! Turns query-client results into chat transcript messages.

use crate::client::{AskOutcome, ConnectionCheck};
use crate::model::{ChatMessage, Sender};

/// Messages to append to the transcript for one answered question.
pub(crate) fn reply_messages(outcome: &AskOutcome) -> Vec<ChatMessage> {
    match outcome {
        AskOutcome::Answer { answer, confidence } => vec![ChatMessage::new(
            Sender::Assistant,
            AskOutcome::format_answer(answer, *confidence),
        )],
        AskOutcome::Failed(msg) => vec![ChatMessage::new(Sender::System, format!("Error: {msg}"))],
        AskOutcome::HttpError { status, body } => vec![ChatMessage::new(
            Sender::System,
            format!("API Error: HTTP {status}: {body}"),
        )],
        AskOutcome::Fallback(text) => vec![
            ChatMessage::new(
                Sender::System,
                "API server not running. Using mock response for demonstration.",
            ),
            ChatMessage::new(Sender::Assistant, text.clone()),
        ],
        AskOutcome::Timeout => vec![ChatMessage::new(
            Sender::System,
            "Request timeout: The AI agent took too long to respond.",
        )],
        AskOutcome::Error(msg) => vec![ChatMessage::new(
            Sender::System,
            format!("Unexpected error: {msg}"),
        )],
    }
}

pub(crate) fn connection_message(check: &ConnectionCheck) -> ChatMessage {
    let text = match check {
        ConnectionCheck::Healthy => {
            "Connection test successful. AI agent is ready for full functionality.".to_string()
        }
        ConnectionCheck::HttpStatus(code) => {
            format!("Connection test failed: HTTP {code}. Mock responses will be used.")
        }
        ConnectionCheck::Unreachable => "API server not running. Chat will use mock responses \
             until the API server is started from the Control tab."
            .to_string(),
        ConnectionCheck::Failed(e) => {
            format!("Connection test failed: {e}. Mock responses will be used.")
        }
    };
    ChatMessage::new(Sender::System, text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answer_becomes_single_assistant_message() {
        let msgs = reply_messages(&AskOutcome::Answer {
            answer: "Use MFA".into(),
            confidence: 0.912,
        });
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].sender, Sender::Assistant);
        assert_eq!(msgs[0].text, "Use MFA\n\n[Confidence: 0.91]");
    }

    #[test]
    fn fallback_announces_mock_then_answers() {
        let msgs = reply_messages(&AskOutcome::Fallback("canned".into()));
        let senders: Vec<_> = msgs.iter().map(|m| m.sender).collect();
        assert_eq!(senders, vec![Sender::System, Sender::Assistant]);
        assert_eq!(msgs[1].text, "canned");
    }

    #[test]
    fn http_error_is_system_message() {
        let msgs = reply_messages(&AskOutcome::HttpError {
            status: 502,
            body: "bad gateway".into(),
        });
        assert_eq!(msgs[0].sender, Sender::System);
        assert_eq!(msgs[0].text, "API Error: HTTP 502: bad gateway");
    }

    #[test]
    fn connection_messages_name_the_status() {
        assert!(connection_message(&ConnectionCheck::HttpStatus(500))
            .text
            .contains("HTTP 500"));
        assert!(connection_message(&ConnectionCheck::Healthy)
            .text
            .contains("successful"));
    }
}
