use serde_json::{Value, json};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::time::Duration;
use taskpilot::context::{Context, TargetShell};
use taskpilot::protocol::Plan;
use taskpilot::protocol::planner::{LLMPlanner, PlanError, Planner};
use taskpilot::tools::llm::{ClientError, HttpReply, LLMClient, RetryPolicy, Transport};

/// Answers from a fixed list of (status, body) pairs and remembers the URLs hit.
struct CannedEndpoint {
    replies: RefCell<VecDeque<(u16, String)>>,
    urls: RefCell<Vec<String>>,
}

impl CannedEndpoint {
    fn new(replies: &[(u16, String)]) -> Self {
        Self {
            replies: RefCell::new(replies.iter().cloned().collect()),
            urls: RefCell::new(Vec::new()),
        }
    }
}

impl Transport for CannedEndpoint {
    fn post_json(
        &self,
        url: &str,
        _api_key: &str,
        _body: &Value,
        _timeout: Duration,
    ) -> Result<HttpReply, ClientError> {
        self.urls.borrow_mut().push(url.to_string());
        match self.replies.borrow_mut().pop_front() {
            Some((status, body)) => Ok(HttpReply { status, body }),
            None => Err(ClientError::Network("connection refused".into())),
        }
    }
}

fn generated(text: &str) -> String {
    json!([{ "generated_text": text }]).to_string()
}

fn planner(replies: &[(u16, String)], target: TargetShell) -> LLMPlanner<CannedEndpoint> {
    let context = Context::new("hf_integration")
        .with_model_url("http://models.local/primary")
        .with_fallback_url("http://models.local/fallback");
    let llm = LLMClient::with_transport(CannedEndpoint::new(replies), &context)
        .with_policy(RetryPolicy::immediate(3));
    LLMPlanner::new(llm, target)
}

#[test]
fn destructive_step_rejects_the_whole_plan() {
    let reply = "<s>[INST] plan it [/INST]\n\
                 Step 1:\nDescription: List files\nCommand: ls\n\n\
                 Step 2:\nDescription: Remove file\nCommand: rm -rf /\n";
    let mut planner = planner(
        &[(200, "[]".into()), (200, generated(reply))],
        TargetShell::Windows,
    );

    let result = planner.generate_plan("clean up the disk");
    assert_eq!(result, Err(PlanError::UnsafeCommand("rm -rf /".into())));
}

#[test]
fn unavailable_primary_model_falls_back_silently() {
    let reply = "Step 1:\nDescription: Show notes\nCommand: cat notes.txt\nValidation: notes printed";
    let mut planner = planner(
        &[
            (503, String::new()),
            (503, String::new()),
            (503, String::new()),
            (200, generated(reply)),
        ],
        TargetShell::Windows,
    );

    let plan = planner.generate_plan("show my notes").unwrap();
    assert_eq!(plan.len(), 1);
    assert_eq!(plan.steps[0].command(), "type notes.txt");
    assert!(planner.llm().using_fallback());
    assert_eq!(planner.llm().url(), "http://models.local/fallback");
}

#[test]
fn unreachable_endpoints_yield_the_fallback_plan() {
    let mut planner = planner(&[], TargetShell::Posix);

    let plan = planner.generate_plan("anything at all").unwrap();
    assert_eq!(plan, Plan::fallback(TargetShell::Posix));
    assert_eq!(plan.steps[0].command(), "pwd");
}
