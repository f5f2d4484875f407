/// Generation stage runner.
///
/// One stage is at most two model invocations: the first may request retrieval tool
/// calls, which are resolved and fed back as a follow-up turn; the second runs without
/// tools so the result is always final text.
use std::sync::Arc;

use tracing::{info, warn};

use crate::error::AppError;
use crate::tools::RetrievalTools;
use tailor_common::chat::ChatModel;
use tailor_common::openai::Message;

/// Sent as the follow-up turn when every requested tool call was dropped.
const NO_TOOL_RESULTS: &str = "No retrieval results were available. Answer from the information above.";

pub struct StageRunner {
    model: Arc<dyn ChatModel>,
    tools: RetrievalTools,
}

impl StageRunner {
    pub fn new(model: Arc<dyn ChatModel>, tools: RetrievalTools) -> Self {
        Self { model, tools }
    }

    pub async fn run_stage(
        &self,
        mut messages: Vec<Message>,
        tools_enabled: bool,
    ) -> Result<String, AppError> {
        let catalog = tools_enabled.then(|| self.tools.catalog());
        let reply = self.model.invoke(&messages, catalog).await?;

        if !tools_enabled || reply.tool_calls.is_empty() {
            return Ok(reply.content);
        }

        let mut outputs = Vec::with_capacity(reply.tool_calls.len());
        for call in &reply.tool_calls {
            let name = call.function.name.as_str();
            info!(tool = name, "using tool");
            match self.tools.call(name, &call.function.arguments).await {
                Ok(output) => outputs.push(output),
                Err(e @ (AppError::UnknownTool(_) | AppError::InvalidToolArguments { .. })) => {
                    warn!(tool = name, error = %e, "dropping tool call");
                }
                Err(e) => return Err(e),
            }
        }

        let follow_up = if outputs.is_empty() {
            NO_TOOL_RESULTS.to_string()
        } else {
            outputs.join("\n\n")
        };
        messages.push(Message::assistant(reply.content));
        messages.push(Message::user(follow_up));

        let final_reply = self.model.invoke(&messages, None).await?;
        if !final_reply.tool_calls.is_empty() {
            warn!(
                requested = final_reply.tool_calls.len(),
                "model requested tools after results were supplied, ignoring"
            );
        }
        Ok(final_reply.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SourceType;
    use crate::testing::{tool_call, InMemorySearch, ScriptedModel};
    use crate::tools::NO_GUIDE_CONTENT;
    use tailor_common::chat::AssistantReply;

    fn runner(model: Arc<ScriptedModel>) -> StageRunner {
        let search = InMemorySearch::default().with(SourceType::Cv, &["Python at Acme"]);
        StageRunner::new(model, RetrievalTools::new(Arc::new(search)).unwrap())
    }

    fn prompt() -> Vec<Message> {
        vec![Message::system("Analyze the job description.")]
    }

    #[tokio::test]
    async fn test_no_tool_calls_is_single_invocation() {
        let model = Arc::new(ScriptedModel::new(vec![AssistantReply::text("analysis")]));
        let out = runner(Arc::clone(&model)).run_stage(prompt(), true).await.unwrap();

        assert_eq!(out, "analysis");
        let calls = model.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].tools_enabled);
    }

    #[tokio::test]
    async fn test_one_tool_call_then_forced_text() {
        let model = Arc::new(ScriptedModel::new(vec![
            AssistantReply {
                content: "let me check".to_string(),
                tool_calls: vec![tool_call("retrieve_cv_content", "python")],
            },
            AssistantReply::text("final summary"),
        ]));
        let out = runner(Arc::clone(&model)).run_stage(prompt(), true).await.unwrap();

        assert_eq!(out, "final summary");
        let calls = model.calls();
        assert_eq!(calls.len(), 2);
        assert!(!calls[1].tools_enabled);

        let second = &calls[1].messages;
        assert_eq!(second.len(), 3);
        assert_eq!(second[1], Message::assistant("let me check"));
        assert_eq!(second[2], Message::user("CV Section 1:\nPython at Acme"));
    }

    #[tokio::test]
    async fn test_many_tool_calls_with_unknown_name() {
        let model = Arc::new(ScriptedModel::new(vec![
            AssistantReply {
                content: String::new(),
                tool_calls: vec![
                    tool_call("retrieve_cv_content", "python"),
                    tool_call("search_the_web", "acme"),
                    tool_call("retrieve_cover_letter_guide", "structure"),
                    tool_call("retrieve_cv_content", "leadership"),
                ],
            },
            // Asking again on the forced-text turn must not trigger a third call.
            AssistantReply {
                content: "done".to_string(),
                tool_calls: vec![tool_call("retrieve_cv_content", "again")],
            },
        ]));
        let out = runner(Arc::clone(&model)).run_stage(prompt(), true).await.unwrap();

        assert_eq!(out, "done");
        let calls = model.calls();
        assert_eq!(calls.len(), 2);
        let follow_up = &calls[1].messages[2].content;
        assert_eq!(
            follow_up,
            &format!(
                "CV Section 1:\nPython at Acme\n\n{NO_GUIDE_CONTENT}\n\nCV Section 1:\nPython at Acme"
            )
        );
    }

    #[tokio::test]
    async fn test_all_tool_calls_dropped_still_finishes() {
        let model = Arc::new(ScriptedModel::new(vec![
            AssistantReply {
                content: String::new(),
                tool_calls: vec![tool_call("nope", "x")],
            },
            AssistantReply::text("answer"),
        ]));
        let out = runner(Arc::clone(&model)).run_stage(prompt(), true).await.unwrap();
        assert_eq!(out, "answer");
        let calls = model.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].messages[2].content, NO_TOOL_RESULTS);
    }

    #[tokio::test]
    async fn test_tools_disabled() {
        let model = Arc::new(ScriptedModel::new(vec![AssistantReply {
            content: "Length assessment: OK".to_string(),
            tool_calls: vec![tool_call("retrieve_cv_content", "x")],
        }]));
        let out = runner(Arc::clone(&model)).run_stage(prompt(), false).await.unwrap();
        assert_eq!(out, "Length assessment: OK");
        let calls = model.calls();
        assert_eq!(calls.len(), 1);
        assert!(!calls[0].tools_enabled);
    }
}
