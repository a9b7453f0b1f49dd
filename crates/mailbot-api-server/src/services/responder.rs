use crate::database::ThreadMessage;
use crate::services::completion::{ChatMessage, CompletionBackend};
use std::sync::Arc;
use tracing::error;

/// Reserved sender identity for automated replies. Human senders are email
/// addresses, so this value cannot collide with one.
pub const BOT_SENDER: &str = "MarketingBot";

/// Canned reply stored whenever the completion backend fails for any reason.
pub const FALLBACK_REPLY: &str = "I apologize, but I'm having trouble generating a response. Please contact our support team at support@techcorpx.com for immediate assistance.";

const COMPANY_PROFILE: &str = r#"Company: TechCorp X

About Us:
TechCorp X is a leading technology solutions provider specializing in Cloud Services, AI Solutions, and Data Analytics.

Products and Services:
1. Cloud Services
   - Enterprise cloud infrastructure
   - Cloud storage solutions
   - Cloud security services
   Pricing: Starting at $99/month

2. AI Solutions
   - Custom AI model development
   - AI integration services
   - Machine learning pipelines
   Pricing: Custom pricing based on requirements

3. Data Analytics
   - Business intelligence tools
   - Real-time analytics
   - Predictive analytics
   Pricing: Starting at $199/month

Support: 24/7 available via support@techcorpx.com or 1-800-TECH-X"#;

/// Produces the automated reply for an inbound message given the prior
/// thread history. One completion call per message; any failure is masked
/// into [`FALLBACK_REPLY`] and never surfaces to the caller.
pub struct ResponderEngine {
    backend: Arc<dyn CompletionBackend>,
    system_prompt: String,
}

impl ResponderEngine {
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        let system_prompt = format!(
            "You are an AI marketing assistant for TechCorp X. \
             Use the following company information to respond to customer inquiries:\n\n\
             {COMPANY_PROFILE}\n\n\
             Guidelines:\n\
             - Be professional but friendly\n\
             - Provide specific information about our products and services\n\
             - If you don't have specific information, be honest and offer to connect the customer with a sales representative\n\
             - Always maintain a helpful and solution-oriented approach\n\
             - Keep responses concise but informative"
        );

        Self { backend, system_prompt }
    }

    /// Map the stored thread onto a role-tagged message sequence: the system
    /// prompt, the history in order, then the latest human message. History
    /// entries authored by [`BOT_SENDER`] become "assistant" turns, everything
    /// else is "user". No filtering, no truncation.
    fn build_messages(&self, message: &str, history: &[ThreadMessage]) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(history.len() + 2);

        messages.push(ChatMessage {
            role: "system".to_string(),
            content: self.system_prompt.clone(),
        });

        for entry in history {
            let role = if entry.sender == BOT_SENDER { "assistant" } else { "user" };
            messages.push(ChatMessage {
                role: role.to_string(),
                content: entry.body.clone(),
            });
        }

        messages.push(ChatMessage {
            role: "user".to_string(),
            content: message.to_string(),
        });

        messages
    }

    pub async fn respond(&self, message: &str, history: &[ThreadMessage]) -> String {
        let messages = self.build_messages(message, history);

        match self.backend.generate(&messages).await {
            Ok(text) => text,
            Err(e) => {
                error!("Completion failed, substituting fallback reply: {:#}", e);
                FALLBACK_REPLY.to_string()
            }
        }
    }
}
