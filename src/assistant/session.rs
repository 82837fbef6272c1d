use crate::assistant::llm::{CollaboratorError, LanguageModel};
use crate::assistant::prompt::{Prompt, DEFAULT_SYSTEM_PREAMBLE};
use crate::core::entity::EntityId;
use crate::core::store::EntityStore;
use crate::graph::relationship_graph::RelationshipGraph;
use crate::retrieval::retriever::{ContextRetriever, RetrievalLimits};
use chrono::{DateTime, Local};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Exchanges kept in the conversation history.
pub const HISTORY_LIMIT: usize = 10;

/// One answered question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exchange {
    pub timestamp: DateTime<Local>,
    pub question: String,
    pub answer: String,
}

/// Question answering over a loaded portfolio.
///
/// Each question gets a fresh context bundle; the model never sees earlier
/// exchanges. Only successful answers enter the history.
pub struct Assistant<M> {
    model: M,
    retriever: ContextRetriever,
    limits: RetrievalLimits,
    preamble: String,
    history: VecDeque<Exchange>,
}

impl<M: LanguageModel> Assistant<M> {
    pub fn new(model: M) -> Self {
        Self {
            model,
            retriever: ContextRetriever::default(),
            limits: RetrievalLimits::default(),
            preamble: DEFAULT_SYSTEM_PREAMBLE.to_string(),
            history: VecDeque::with_capacity(HISTORY_LIMIT),
        }
    }

    pub fn with_retriever(mut self, retriever: ContextRetriever, limits: RetrievalLimits) -> Self {
        self.retriever = retriever;
        self.limits = limits;
        self
    }

    pub fn with_preamble(mut self, preamble: impl Into<String>) -> Self {
        self.preamble = preamble.into();
        self
    }

    /// The prompt that [`ask`](Self::ask) would send.
    pub fn prepare(
        &self,
        question: &str,
        focus: Option<&EntityId>,
        store: &EntityStore,
        graph: &RelationshipGraph,
    ) -> Prompt {
        let bundle = self
            .retriever
            .retrieve(question, focus, store, graph, self.limits);
        Prompt::from_bundle(self.preamble.clone(), &bundle, question)
    }

    /// Answer `question`, optionally about one entity.
    ///
    /// Model failures are returned as they are and leave the history
    /// untouched.
    pub fn ask(
        &mut self,
        question: &str,
        focus: Option<&EntityId>,
        store: &EntityStore,
        graph: &RelationshipGraph,
    ) -> Result<String, CollaboratorError> {
        let prompt = self.prepare(question, focus, store, graph);
        match self.model.complete(&prompt) {
            Ok(answer) => {
                info!("answered question ({} chars)", answer.chars().count());
                self.record(question, &answer);
                Ok(answer)
            }
            Err(e) => {
                warn!("language model call failed: {}", e);
                Err(e)
            }
        }
    }

    fn record(&mut self, question: &str, answer: &str) {
        if self.history.len() == HISTORY_LIMIT {
            self.history.pop_front();
        }
        self.history.push_back(Exchange {
            timestamp: Local::now(),
            question: question.to_string(),
            answer: answer.to_string(),
        });
    }

    /// Past exchanges, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &Exchange> {
        self.history.iter()
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::entity::Month;
    use crate::core::records::CompanyRecord;
    use rust_decimal_macros::dec;
    use std::cell::RefCell;

    struct Recording {
        prompts: RefCell<Vec<Prompt>>,
    }

    impl LanguageModel for Recording {
        fn complete(&self, prompt: &Prompt) -> Result<String, CollaboratorError> {
            self.prompts.borrow_mut().push(prompt.clone());
            Ok(format!("resposta {}", self.prompts.borrow().len()))
        }
    }

    struct Unreachable;

    impl LanguageModel for Unreachable {
        fn complete(&self, _prompt: &Prompt) -> Result<String, CollaboratorError> {
            Err(CollaboratorError::Status {
                status: 503,
                body: "unavailable".to_string(),
            })
        }
    }

    fn store() -> EntityStore {
        EntityStore::load(
            vec![
                CompanyRecord::new("A", Month::new(2025, 1).unwrap(), dec!(10), dec!(5), "Varejo"),
                CompanyRecord::new("A", Month::new(2025, 2).unwrap(), dec!(12), dec!(6), "Varejo"),
            ],
            vec![],
        )
        .unwrap()
    }

    #[test]
    fn test_prompt_carries_context() {
        let store = store();
        let graph = RelationshipGraph::default();
        let mut assistant = Assistant::new(Recording {
            prompts: RefCell::new(Vec::new()),
        });
        let focus = EntityId::new("A");
        let answer = assistant
            .ask("como está a empresa?", Some(&focus), &store, &graph)
            .unwrap();
        assert_eq!(answer, "resposta 1");

        let prompts = assistant.model.prompts.borrow();
        assert_eq!(prompts[0].question, "como está a empresa?");
        assert!(prompts[0].context.starts_with("Entity A "));
        assert_eq!(prompts[0].system_preamble, DEFAULT_SYSTEM_PREAMBLE);
    }

    #[test]
    fn test_history_keeps_last_ten() {
        let store = store();
        let graph = RelationshipGraph::default();
        let mut assistant = Assistant::new(Recording {
            prompts: RefCell::new(Vec::new()),
        });
        for i in 0..12 {
            assistant
                .ask(&format!("pergunta {}", i), None, &store, &graph)
                .unwrap();
        }
        let questions: Vec<&str> = assistant.history().map(|e| e.question.as_str()).collect();
        assert_eq!(questions.len(), HISTORY_LIMIT);
        assert_eq!(questions[0], "pergunta 2");
        assert_eq!(questions[9], "pergunta 11");
    }

    #[test]
    fn test_failure_is_returned_not_recorded() {
        let store = store();
        let graph = RelationshipGraph::default();
        let mut assistant = Assistant::new(Unreachable);
        let err = assistant.ask("risco?", None, &store, &graph).unwrap_err();
        assert!(matches!(err, CollaboratorError::Status { status: 503, .. }));
        assert_eq!(assistant.history().count(), 0);
    }
}
