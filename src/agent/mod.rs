//! Orchestration state machine
//!
//! One user turn runs plan -> act -> reflect until the planner declares it has
//! enough evidence, then finalize. Two bounds guarantee termination: the
//! tool-call budget (every Acting transition counts) and a planner-round guard
//! for the degenerate case of a planner that emits protocol garbage forever.
//! All tool failures come back as observations; only the iteration budget is
//! fatal to the loop, and it forces a best-effort finalization rather than an
//! error.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::AgentConfig;
use crate::error::LlmError;
use crate::llm::{Directive, HistoryEntry, ReasoningClient};
use crate::tools::{tool_catalog, ToolDispatcher};

/// Loop phase. Acting and Reflecting carry their payload so a transition
/// cannot happen without the data it needs.
#[derive(Debug)]
pub enum Phase {
    Planning,
    Acting { name: String, arguments: Value },
    Reflecting { observation: String },
    Finalizing { declared: Option<String> },
}

/// Per-turn conversation state. Created at the start of a turn, owned by the
/// loop, never shared across turns. `tool_call_count` only ever increases.
#[derive(Debug)]
pub struct TurnState {
    pub history: Vec<HistoryEntry>,
    pub tool_call_count: u32,
    pub phase: Phase,
}

impl TurnState {
    fn new(question: &str) -> Self {
        Self {
            history: vec![HistoryEntry::user(question)],
            tool_call_count: 0,
            phase: Phase::Planning,
        }
    }
}

/// Outcome of one turn.
#[derive(Debug)]
pub struct TurnReport {
    pub answer: String,
    pub tool_calls: u32,
    /// True when finalization was forced by the iteration budget rather than
    /// declared by the planner.
    pub forced: bool,
}

const FORCED_FINALIZE_INSTRUCTION: &str =
    "The tool-call budget for this question is exhausted. Produce your final answer now \
     from the evidence gathered so far, using the final-declaration JSON shape. \
     Tool calls are no longer permitted. If the evidence is insufficient, say what you \
     could determine and suggest a narrower question.";

const BUDGET_FALLBACK_ANSWER: &str =
    "I ran out of query budget before reaching a confident answer. Try narrowing the \
     question (a shorter time range, a single table, or fewer breakdowns) and ask again.";

/// Drives the plan/act/reflect/finalize loop for analytics questions.
pub struct AnalystAgent {
    llm: Arc<dyn ReasoningClient>,
    dispatcher: ToolDispatcher,
    max_tool_calls: u32,
    dataset_id: String,
}

impl AnalystAgent {
    pub fn new(
        llm: Arc<dyn ReasoningClient>,
        dispatcher: ToolDispatcher,
        agent: &AgentConfig,
        dataset_id: impl Into<String>,
    ) -> Self {
        Self {
            llm,
            dispatcher,
            max_tool_calls: agent.max_tool_calls,
            dataset_id: dataset_id.into(),
        }
    }

    /// Run one full turn: question in, finalized answer out.
    ///
    /// Only LLM transport failure escapes as `Err`; everything else resolves
    /// to an answer, possibly one explaining what could not be obtained.
    pub async fn run_turn(&self, question: &str) -> Result<TurnReport, LlmError> {
        info!(model = self.llm.model_name(), "starting turn");
        let system_prompt = self.system_prompt();
        let mut state = TurnState::new(question);

        // Guard against a planner that never produces a valid directive.
        let max_planner_rounds = 2 * self.max_tool_calls + 1;
        let mut planner_rounds = 0u32;

        loop {
            match std::mem::replace(&mut state.phase, Phase::Planning) {
                Phase::Planning => {
                    if planner_rounds >= max_planner_rounds {
                        warn!(planner_rounds, "planner round guard tripped, forcing finalize");
                        state.phase = Phase::Finalizing { declared: None };
                        continue;
                    }
                    planner_rounds += 1;

                    let raw = self.llm.plan(&system_prompt, &state.history).await?;
                    state.history.push(HistoryEntry::assistant(raw.clone()));

                    match Directive::parse(&raw) {
                        Ok(Directive::ToolCall { name, arguments }) => {
                            debug!(tool = %name, "planner requested tool call");
                            state.phase = Phase::Acting { name, arguments };
                        }
                        Ok(Directive::Final { content }) => {
                            debug!("planner declared sufficient evidence");
                            state.phase = Phase::Finalizing {
                                declared: Some(content),
                            };
                        }
                        Err(LlmError::Protocol(msg)) => {
                            warn!("planner protocol violation: {msg}");
                            state.history.push(HistoryEntry::observation(format!(
                                "PROTOCOL ERROR: {msg}. Reply with exactly one JSON object: \
                                 either {{\"tool_call\": {{\"name\", \"arguments\"}}}} or \
                                 {{\"final\": true, \"content\"}}."
                            )));
                            state.phase = Phase::Planning;
                        }
                        Err(other) => return Err(other),
                    }
                }

                Phase::Acting { name, arguments } => {
                    state.tool_call_count += 1;
                    info!(
                        tool = %name,
                        call = state.tool_call_count,
                        budget = self.max_tool_calls,
                        "acting"
                    );
                    let observation = self.dispatcher.observe(&name, &arguments).await;
                    state.phase = Phase::Reflecting { observation };
                }

                Phase::Reflecting { observation } => {
                    debug!(chars = observation.len(), "recording observation");
                    state.history.push(HistoryEntry::observation(observation));
                    if state.tool_call_count >= self.max_tool_calls {
                        warn!(
                            tool_calls = state.tool_call_count,
                            "iteration budget exhausted, forcing finalize"
                        );
                        state.phase = Phase::Finalizing { declared: None };
                    } else {
                        state.phase = Phase::Planning;
                    }
                }

                Phase::Finalizing { declared } => {
                    let (answer, forced) = match declared {
                        Some(content) => (content, false),
                        None => (self.forced_answer(&system_prompt, &mut state).await, true),
                    };
                    info!(tool_calls = state.tool_call_count, forced, "turn complete");
                    return Ok(TurnReport {
                        answer,
                        tool_calls: state.tool_call_count,
                        forced,
                    });
                }
            }
        }
    }

    /// One last no-tools call for a best-effort summary of the evidence.
    async fn forced_answer(&self, system_prompt: &str, state: &mut TurnState) -> String {
        state
            .history
            .push(HistoryEntry::user(FORCED_FINALIZE_INSTRUCTION));
        match self.llm.plan(system_prompt, &state.history).await {
            Ok(raw) => match Directive::parse(&raw) {
                Ok(Directive::Final { content }) => content,
                _ => BUDGET_FALLBACK_ANSWER.to_string(),
            },
            Err(e) => {
                warn!("forced finalization call failed: {e}");
                BUDGET_FALLBACK_ANSWER.to_string()
            }
        }
    }

    fn system_prompt(&self) -> String {
        let tools = serde_json::to_string_pretty(&tool_catalog())
            .unwrap_or_else(|_| "[]".to_string());
        format!(
            r#"You are a careful data analyst answering questions against the BigQuery dataset `{dataset}`.

AVAILABLE TOOLS:
{tools}

HARD RULES FOR SQL:
- Read-only: SELECT statements only.
- Never use SELECT * - list the columns you need.
- Every query must end with a numeric LIMIT of at most 1000.
- Reference tables as backtick-delimited `{dataset}.table_name`.
- Queries that would scan more than 1 GiB are refused; prefer selective columns and WHERE clauses.

PROCESS:
- Inspect a table's schema before querying it for the first time.
- One tool call per reply. Read each observation before deciding your next step.
- When you have enough evidence, declare your final answer.

RESPONSE FORMAT - reply with exactly one JSON object, nothing else:
  To call a tool:       {{"tool_call": {{"name": "<tool>", "arguments": {{...}}}}}}
  To answer:            {{"final": true, "content": "<your answer with the key numbers>"}}"#,
            dataset = self.dataset_id,
            tools = tools,
        )
    }
}
