use crate::retrieval::bundle::ContextBundle;
use serde::{Deserialize, Serialize};

/// Instructions sent as the system message. Answers are expected in
/// Brazilian Portuguese and may only use figures from the context.
pub const DEFAULT_SYSTEM_PREAMBLE: &str = "\
Você é um analista financeiro que avalia CNPJs de uma carteira bancária \
para decisões de crédito e relacionamento.
Regras:
1. Responda sempre em português brasileiro.
2. Use apenas os dados do contexto; nunca invente números.
3. Cite os CNPJs pelo identificador exato e os valores como aparecem no contexto (R$ 1.000,00).
4. Quando uma métrica estiver marcada como \"not available\" ou ausente, responda \"N/D\".
5. Cite as métricas calculadas quando forem relevantes: HHI, burn rate, runway, \
CV do saldo, score de saúde, risco de dependência e score de crédito.
6. Sugira ações concretas e use markdown para organizar a resposta.";

/// The three parts handed to the language model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    pub system_preamble: String,
    pub context: String,
    pub question: String,
}

impl Prompt {
    pub fn new(
        system_preamble: impl Into<String>,
        context: impl Into<String>,
        question: impl Into<String>,
    ) -> Self {
        Self {
            system_preamble: system_preamble.into(),
            context: context.into(),
            question: question.into(),
        }
    }

    pub fn from_bundle(
        system_preamble: impl Into<String>,
        bundle: &ContextBundle,
        question: impl Into<String>,
    ) -> Self {
        Self::new(system_preamble, bundle.render(), question)
    }

    /// Context and question as a single user message.
    ///
    /// ```
    /// use cnpj_insight::assistant::prompt::Prompt;
    ///
    /// let prompt = Prompt::new("system", "- entities: 3", "quantas empresas?");
    /// let message = prompt.user_message();
    /// assert!(message.starts_with("CONTEXTO DOS DADOS:\n- entities: 3"));
    /// assert!(message.contains("PERGUNTA:\nquantas empresas?"));
    /// ```
    pub fn user_message(&self) -> String {
        format!(
            "CONTEXTO DOS DADOS:\n{}\n\nPERGUNTA:\n{}\n\n\
             Use apenas os dados do contexto acima e responda \"N/D\" para o que não estiver nele.",
            self.context, self.question
        )
    }
}
