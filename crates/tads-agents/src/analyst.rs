use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tads_models::analysis::{AnalysisReport, AnalystKind, AnalystRequest};

use crate::error::AgentError;
use crate::generator::TextGenerator;
use crate::parser::parse_analyst_reply;
use crate::prompts::{analyst_system_prompt, analyst_user_prompt};

/// One independent analyst. Mockable for testing.
#[async_trait]
pub trait AnalystCapability: Send + Sync {
    fn kind(&self) -> AnalystKind;

    async fn analyze(&self, request: &AnalystRequest) -> Result<AnalysisReport, AgentError>;
}

/// An analyst that asks a text generator for a JSON report.
pub struct LlmAnalyst {
    kind: AnalystKind,
    priority: u8,
    generator: Arc<dyn TextGenerator>,
}

impl LlmAnalyst {
    pub fn new(kind: AnalystKind, priority: u8, generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            kind,
            priority,
            generator,
        }
    }
}

#[async_trait]
impl AnalystCapability for LlmAnalyst {
    fn kind(&self) -> AnalystKind {
        self.kind
    }

    async fn analyze(&self, request: &AnalystRequest) -> Result<AnalysisReport, AgentError> {
        let system_prompt = analyst_system_prompt(self.kind);
        let user_prompt = analyst_user_prompt(request)?;
        let raw = self.generator.generate(&system_prompt, &user_prompt).await?;
        let reply = parse_analyst_reply(&raw)?;

        Ok(AnalysisReport {
            analyst: self.kind,
            symbol: request.symbol.clone(),
            trade_date: request.trade_date,
            content: reply.content,
            rating: reply.rating,
            priority: self.priority,
            confidence: reply.confidence.clamp(Decimal::ZERO, Decimal::ONE),
            key_points: reply.key_points,
            warning: None,
            produced_at: Utc::now(),
        })
    }
}
