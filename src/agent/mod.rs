//! The agent loop: the scheduler that turns a user message into a finished
//! assistant turn, dispatching tool calls, honouring skill invocations,
//! steering, abort, and context compaction along the way.
//!
//! `AgentRunner` owns one conversation's mutable state behind a single
//! `Mutex` (locked only for the duration of a field read/write, never
//! across an `.await`) plus a `busy` flag that rejects overlapping
//! `chat()` calls rather than queuing them. The outer `chat()` loop wraps
//! an inner ReAct loop (`inner_loop`): stream one turn from the adapter,
//! dispatch any tool calls it produced, repeat until the model stops
//! calling tools, the turn cap is hit, or abort fires.

mod slash;

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use tracing::{debug, warn, Instrument};

use crate::abort::{AbortHandle, AbortSignal};
use crate::adapter::{Adapter, AdapterEvent, AdapterStream, FinishReason as AdapterFinishReason, ToolSchema};
use crate::config::AgentConfig;
use crate::context::{estimate_messages, ContextManager};
use crate::error::{AgentError, Result};
use crate::events::{EmitOutcome, Event, EventBus};
use crate::message::{project_to_llm_messages, AgentMessage, LLMMessage, Role, StreamEvent, ToolCall};
use crate::placeholder::resolve_content;
use crate::skills::{Skill, SkillContext, SkillEngine};
use crate::tools::builtin::{ForkExecutor, SkillTool};
use crate::tools::tool::OutputSink;
use crate::tools::{dispatch, Tool, ToolContext, ToolError, ToolRegistry};

use slash::parse_slash_invocation;

/// Why an inner-loop run (and therefore a `chat()` call) stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// The model produced a turn with no tool calls.
    Complete,
    /// `max_turns` was reached before the model stopped calling tools.
    MaxTurns,
    /// Abort fired mid-turn or between turns.
    Aborted,
    /// The adapter could not be reached (after exhausting transient retries).
    Error,
}

#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub message: AgentMessage,
    pub finish_reason: FinishReason,
}

struct RunnerState {
    history: Vec<AgentMessage>,
    current_model: String,
    allowed_tools: Option<Vec<String>>,
    /// Env vars contributed by the currently-active skill's `primary_env`
    /// mapping and per-skill config entry, injected into subprocess tool
    /// calls for the duration of that skill's invocation.
    active_env: std::collections::HashMap<String, String>,
    steering_queue: VecDeque<String>,
    follow_up_queue: VecDeque<String>,
}

/// One conversation. Shared by reference (`Arc<AgentRunner>`) so `steer()`
/// and `abort()` can be called from outside the task running `chat()`.
pub struct AgentRunner {
    engine: Arc<SkillEngine>,
    adapter: Arc<dyn Adapter>,
    events: Arc<EventBus>,
    context: Arc<ContextManager>,
    tools: Arc<ToolRegistry>,
    config: AgentConfig,
    cwd: PathBuf,
    /// Set on fork children so emitted events carry a distinguishing tracing span.
    child_id: Option<String>,
    stream_sink: Option<Arc<dyn Fn(StreamEvent) + Send + Sync>>,
    busy: AtomicBool,
    /// `None` on fork children: only the root conversation can fire abort;
    /// children merely observe the inherited signal.
    abort_handle: Option<AbortHandle>,
    abort_signal: AbortSignal,
    state: Mutex<RunnerState>,
}

impl AgentRunner {
    pub fn new(
        config: AgentConfig,
        adapter: Arc<dyn Adapter>,
        engine: Arc<SkillEngine>,
        tools: Arc<ToolRegistry>,
        events: Arc<EventBus>,
        context: Arc<ContextManager>,
        cwd: PathBuf,
    ) -> Self {
        let (abort_handle, abort_signal) = AbortHandle::new();
        let current_model = config.model.clone();
        AgentRunner {
            engine,
            adapter,
            events,
            context,
            tools,
            cwd,
            child_id: None,
            stream_sink: None,
            busy: AtomicBool::new(false),
            abort_handle: Some(abort_handle),
            abort_signal,
            state: Mutex::new(RunnerState {
                history: Vec::new(),
                current_model,
                allowed_tools: None,
                active_env: std::collections::HashMap::new(),
                steering_queue: VecDeque::new(),
                follow_up_queue: VecDeque::new(),
            }),
            config,
        }
    }

    /// Receive every `StreamEvent` this runner (and its forks) emit, e.g. to
    /// forward them over a websocket/SSE connection.
    pub fn with_stream_sink(mut self, sink: Arc<dyn Fn(StreamEvent) + Send + Sync>) -> Self {
        self.stream_sink = Some(sink);
        self
    }

    fn child(parent: &AgentRunner, child_id: String) -> AgentRunner {
        AgentRunner {
            engine: parent.engine.clone(),
            adapter: parent.adapter.clone(),
            events: parent.events.clone(),
            context: parent.context.clone(),
            tools: parent.tools.clone(),
            cwd: parent.cwd.clone(),
            child_id: Some(child_id),
            stream_sink: parent.stream_sink.clone(),
            busy: AtomicBool::new(false),
            abort_handle: None,
            abort_signal: parent.abort_signal.clone(),
            state: Mutex::new(RunnerState {
                history: Vec::new(),
                current_model: parent.config.model.clone(),
                allowed_tools: None,
                active_env: std::collections::HashMap::new(),
                steering_queue: VecDeque::new(),
                follow_up_queue: VecDeque::new(),
            }),
            config: parent.config.clone(),
        }
    }

    /// Fire abort. Idempotent; a no-op on fork children, who instead
    /// observe the root's signal.
    pub fn abort(&self) {
        if let Some(handle) = &self.abort_handle {
            handle.abort();
        }
    }

    /// Queue a steering message, consumed between tool calls within the
    /// current turn. Remaining tool calls in that turn are cancelled once
    /// it is drained.
    pub fn steer(&self, message: impl Into<String>) {
        self.lock_state().steering_queue.push_back(message.into());
    }

    /// Queue a message to be processed as a fresh `chat()` pass once the
    /// current one finishes, without a second `agent_start` for the
    /// in-progress call.
    pub fn follow_up(&self, message: impl Into<String>) {
        self.lock_state().follow_up_queue.push_back(message.into());
    }

    pub fn history(&self) -> Vec<AgentMessage> {
        self.history_snapshot()
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, RunnerState> {
        self.state.lock().expect("agent runner state lock poisoned")
    }

    fn history_snapshot(&self) -> Vec<AgentMessage> {
        self.lock_state().history.clone()
    }

    fn set_history(&self, history: Vec<AgentMessage>) {
        self.lock_state().history = history;
    }

    fn append_history(&self, message: AgentMessage) {
        self.lock_state().history.push(message);
    }

    fn current_model(&self) -> String {
        self.lock_state().current_model.clone()
    }

    fn allowed_tools(&self) -> Option<Vec<String>> {
        self.lock_state().allowed_tools.clone()
    }

    fn active_env(&self) -> std::collections::HashMap<String, String> {
        self.lock_state().active_env.clone()
    }

    fn pop_steer(&self) -> Option<String> {
        self.lock_state().steering_queue.pop_front()
    }

    fn pop_follow_up(&self) -> Option<String> {
        self.lock_state().follow_up_queue.pop_front()
    }

    fn acquire_model(&self, model: String) -> ModelGuard<'_> {
        let mut state = self.lock_state();
        let previous = std::mem::replace(&mut state.current_model, model);
        drop(state);
        ModelGuard { runner: self, previous: Some(previous) }
    }

    fn acquire_allowed_tools(&self, allowed: Vec<String>) -> AllowedToolsGuard<'_> {
        let mut state = self.lock_state();
        let previous = std::mem::replace(&mut state.allowed_tools, Some(allowed));
        drop(state);
        AllowedToolsGuard { runner: self, previous }
    }

    /// Resolve `skill`'s `primary_env` mapping (and any per-skill config
    /// `env` entries) into a concrete env map, then scope it onto the
    /// runner for the duration of the invocation, restored on drop.
    fn acquire_skill_env(&self, skill: &Skill) -> EnvGuard<'_> {
        let mut env = std::collections::HashMap::new();
        if let Some(entry) = self.config.skills.entries.get(skill.config_key()) {
            env.extend(entry.env.clone());
            if let (Some(primary_env), Some(api_key)) = (&skill.metadata.primary_env, &entry.api_key) {
                env.insert(primary_env.clone(), api_key.clone());
            }
        }
        let mut state = self.lock_state();
        let previous = std::mem::replace(&mut state.active_env, env);
        drop(state);
        EnvGuard { runner: self, previous: Some(previous) }
    }

    async fn emit(&self, event: Event) -> EmitOutcome {
        match &self.child_id {
            Some(id) => {
                let span = tracing::debug_span!("child_agent", child_id = %id);
                self.events.emit(event).instrument(span).await
            }
            None => self.events.emit(event).await,
        }
    }

    fn emit_stream(&self, event: StreamEvent) {
        if let Some(sink) = &self.stream_sink {
            sink(event);
        }
    }

    /// The outer loop: one user message in, one assistant message out.
    /// Rejects overlapping calls on the same runner rather than queuing
    /// them — callers that want concurrency should use separate runners
    /// (e.g. via `execute_fork`).
    pub async fn chat(&self, message: impl Into<String>) -> Result<ChatOutcome> {
        if self.busy.swap(true, Ordering::SeqCst) {
            return Err(AgentError::Tool("agent runner is already processing a chat() call".into()));
        }
        let _busy_guard = BusyGuard(&self.busy);

        let message = message.into();
        let input_outcome = self.emit(Event::Input { message: message.clone() }).await;
        if let Some(handled) = input_outcome.handled {
            return Ok(ChatOutcome {
                message: AgentMessage::assistant(handled.unwrap_or_default()),
                finish_reason: FinishReason::Complete,
            });
        }

        if let Some((name, args)) = parse_slash_invocation(&message) {
            return self.handle_slash_invocation(name, args).await;
        }

        self.append_history(AgentMessage::user(message));
        self.emit(Event::AgentStart).await;

        let (mut last, mut reason) = self.inner_loop().await;

        // Open question: a steering message that arrives after max_turns is
        // reached has nowhere left to land in the current pass, so fold it
        // into the follow-up queue and let the next pass handle it as if
        // the caller had sent it as a fresh message.
        if reason == FinishReason::MaxTurns {
            let mut state = self.lock_state();
            while let Some(steered) = state.steering_queue.pop_front() {
                state.follow_up_queue.push_back(steered);
            }
        }

        while let Some(follow_up) = self.pop_follow_up() {
            self.append_history(AgentMessage::user(follow_up));
            let (next_last, next_reason) = self.inner_loop().await;
            if next_last.is_some() {
                last = next_last;
            }
            reason = next_reason;
        }

        self.emit(Event::AgentEnd { finish_reason: format!("{reason:?}") }).await;

        Ok(ChatOutcome {
            message: last.unwrap_or_else(|| AgentMessage::assistant(String::new())),
            finish_reason: reason,
        })
    }

    /// `/name args`: look up a user-invocable skill, resolve placeholders,
    /// and either fork a child agent or run inline with the skill's model
    /// and `allowed_tools` scoped for the duration of the run.
    async fn handle_slash_invocation(&self, name: &str, args: &str) -> Result<ChatOutcome> {
        let snapshot = self.engine.current();
        let skill = snapshot
            .find(name)
            .ok_or_else(|| AgentError::Tool(format!("no such skill `{name}`")))?;

        if !skill.metadata.user_invocable {
            return Err(AgentError::Tool(format!("skill `{name}` is not user-invocable")));
        }

        if skill.metadata.context == SkillContext::Fork {
            let result = self.execute_fork(&skill.name, args).await?;
            let message = AgentMessage::assistant(result);
            self.append_history(message.clone());
            return Ok(ChatOutcome { message, finish_reason: FinishReason::Complete });
        }

        let resolved = resolve_content(&skill.content, args).await;
        self.append_history(AgentMessage::user(resolved));
        self.emit(Event::AgentStart).await;

        let model_guard = skill.metadata.model.clone().map(|model| self.acquire_model(model));
        let tools_guard = if skill.metadata.allowed_tools.is_empty() {
            None
        } else {
            Some(self.acquire_allowed_tools(skill.metadata.allowed_tools.clone()))
        };
        let env_guard = self.acquire_skill_env(&skill);

        let (last, reason) = self.inner_loop().await;

        drop(env_guard);
        drop(tools_guard);
        drop(model_guard);

        self.emit(Event::AgentEnd { finish_reason: format!("{reason:?}") }).await;

        Ok(ChatOutcome {
            message: last.unwrap_or_else(|| AgentMessage::assistant(String::new())),
            finish_reason: reason,
        })
    }

    /// Run `skill_name` as an isolated child agent: fresh history seeded
    /// with `system = skill.content` (resolved) and `user = arguments`,
    /// inheriting `max_turns` and the abort signal. The child's final
    /// assistant message becomes the result.
    async fn execute_fork(&self, skill_name: &str, arguments: &str) -> Result<String> {
        let snapshot = self.engine.current();
        let skill = snapshot
            .find(skill_name)
            .ok_or_else(|| AgentError::Tool(format!("unknown or ineligible skill `{skill_name}`")))?;

        let system_content = resolve_content(&skill.content, arguments).await;
        let child_id = format!("{skill_name}-{}", uuid::Uuid::new_v4());
        let child = AgentRunner::child(self, child_id);

        child.append_history(AgentMessage::system(system_content));
        child.append_history(AgentMessage::user(arguments.to_string()));

        let (last, _reason) = child.inner_loop().await;
        Ok(last.map(|m| m.content).unwrap_or_default())
    }

    /// The ReAct inner loop: stream a turn, dispatch its tool calls (if
    /// any), repeat. Returns the last assistant message produced (if any)
    /// and why the loop stopped.
    async fn inner_loop(&self) -> (Option<AgentMessage>, FinishReason) {
        let mut last_assistant: Option<AgentMessage> = None;
        let mut turn: u32 = 0;

        loop {
            if self.abort_signal.is_aborted() {
                return (last_assistant, FinishReason::Aborted);
            }

            turn += 1;
            if turn > self.config.max_turns {
                return (last_assistant, FinishReason::MaxTurns);
            }

            self.emit(Event::TurnStart { turn }).await;

            self.maybe_compact().await;

            let current_history = self.history_snapshot();
            let transform_outcome = self.emit(Event::ContextTransform { messages: current_history.clone() }).await;
            let active_history = transform_outcome.replaced_messages.unwrap_or(current_history);
            self.set_history(active_history.clone());

            let llm_messages = project_to_llm_messages(&active_history);
            let tool_schemas = if self.config.enable_tools {
                self.tools.schemas(self.allowed_tools().as_deref())
            } else {
                Vec::new()
            };
            let model = self.current_model();

            let stream = match self.call_adapter_with_retry(&llm_messages, &tool_schemas, &model).await {
                Ok(stream) => stream,
                Err(error) => {
                    self.emit_stream(StreamEvent::Error { error: error.to_string() });
                    return (last_assistant, FinishReason::Error);
                }
            };

            let (turn_messages, aborted_mid_stream) = self.drain_adapter_stream(stream).await;

            if aborted_mid_stream {
                self.emit(Event::TurnEnd { turn }).await;
                return (last_assistant, FinishReason::Aborted);
            }

            for turn_message in &turn_messages {
                self.append_history(turn_message.clone());
            }
            let assistant_message = turn_messages
                .into_iter()
                .last()
                .expect("drain_adapter_stream always yields at least the assistant message");
            last_assistant = Some(assistant_message.clone());

            self.emit(Event::TurnEnd { turn }).await;

            if !assistant_message.has_tool_calls() {
                return (last_assistant, FinishReason::Complete);
            }

            self.run_tool_calls(&assistant_message.tool_calls).await;
        }
    }

    async fn maybe_compact(&self) {
        let before = self.history_snapshot();
        if !self.context.should_compact(&before) {
            return;
        }

        let tokens_before = estimate_messages(&before);
        match self.context.compact(&before).await {
            Ok(compacted) => {
                let tokens_after = estimate_messages(&compacted);
                self.emit(Event::Compaction {
                    messages_before: before.len(),
                    messages_after: compacted.len(),
                    tokens_before,
                    tokens_after,
                })
                .await;
                self.set_history(compacted);
            }
            Err(error) => {
                warn!(%error, "context compaction failed; continuing with uncompacted history");
            }
        }
    }

    async fn call_adapter_with_retry(
        &self,
        messages: &[LLMMessage],
        tools: &[ToolSchema],
        model: &str,
    ) -> Result<AdapterStream> {
        const MAX_ATTEMPTS: u32 = 3;
        let mut attempt = 0;

        loop {
            let outcome = self
                .adapter
                .stream(messages, tools, model, self.config.temperature, self.config.max_tokens, self.abort_signal.clone())
                .await;

            match outcome {
                Ok(stream) => return Ok(stream),
                Err(error) if error.is_transient() && attempt < MAX_ATTEMPTS => {
                    attempt += 1;
                    let backoff = Duration::from_millis(200 * 2u64.pow(attempt));
                    warn!(attempt, %error, ?backoff, "retrying transient adapter error");
                    tokio::time::sleep(backoff).await;
                }
                Err(error) => return Err(error),
            }
        }
    }

    /// Consume one adapter stream, re-emitting every item as a
    /// `StreamEvent`, and assemble it into the (optional thinking message,
    /// assistant message) pair that gets appended to history.
    async fn drain_adapter_stream(&self, mut stream: AdapterStream) -> (Vec<AgentMessage>, bool) {
        let mut text = String::new();
        let mut thinking = String::new();
        let mut call_order: Vec<String> = Vec::new();
        let mut calls: HashMap<String, (String, String)> = HashMap::new();
        let mut aborted = false;

        self.emit_stream(StreamEvent::TurnStart);

        while let Some(event) = stream.next().await {
            if self.abort_signal.is_aborted() {
                aborted = true;
                break;
            }

            match event {
                AdapterEvent::TextDelta(delta) => {
                    if text.is_empty() {
                        self.emit_stream(StreamEvent::TextStart);
                    }
                    text.push_str(&delta);
                    self.emit_stream(StreamEvent::TextDelta { content: delta });
                }
                AdapterEvent::ThinkingDelta(delta) => {
                    if thinking.is_empty() {
                        self.emit_stream(StreamEvent::ThinkingStart);
                    }
                    thinking.push_str(&delta);
                    self.emit_stream(StreamEvent::ThinkingDelta { content: delta });
                }
                AdapterEvent::ToolCallStart { id, name } => {
                    call_order.push(id.clone());
                    calls.insert(id.clone(), (name.clone(), String::new()));
                    self.emit_stream(StreamEvent::ToolCallStart { tool_call_id: id, tool_name: name });
                }
                AdapterEvent::ToolCallDelta { id, args_delta } => {
                    if let Some(entry) = calls.get_mut(&id) {
                        entry.1.push_str(&args_delta);
                    }
                    self.emit_stream(StreamEvent::ToolCallDelta { tool_call_id: id, args_delta });
                }
                AdapterEvent::ToolCallEnd { id } => {
                    self.emit_stream(StreamEvent::ToolCallEnd { tool_call_id: id });
                }
                AdapterEvent::Finish { reason } => {
                    if reason == AdapterFinishReason::Aborted {
                        aborted = true;
                    }
                }
            }
        }

        if !text.is_empty() {
            self.emit_stream(StreamEvent::TextEnd);
        }
        if !thinking.is_empty() {
            self.emit_stream(StreamEvent::ThinkingEnd);
        }
        self.emit_stream(StreamEvent::TurnEnd);

        let tool_calls: Vec<ToolCall> = call_order
            .into_iter()
            .filter_map(|id| calls.remove(&id).map(|(name, arguments)| ToolCall { id, name, arguments }))
            .collect();

        let mut messages = Vec::with_capacity(2);
        if !thinking.is_empty() {
            messages.push(AgentMessage {
                role: Role::Thinking,
                content: thinking,
                tool_calls: Vec::new(),
                tool_call_id: None,
                metadata: Default::default(),
            });
        }
        messages.push(AgentMessage::assistant_with_tool_calls(text, tool_calls));

        (messages, aborted)
    }

    /// Dispatch tool calls sequentially. Between each one, drain a pending
    /// steering message (appended as a user message) and cancel the rest
    /// of the batch — the next turn lets the model react to it alongside
    /// whatever tool results already landed.
    async fn run_tool_calls(&self, tool_calls: &[ToolCall]) {
        for call in tool_calls {
            if self.abort_signal.is_aborted() {
                return;
            }

            let before_outcome = self
                .emit(Event::BeforeToolCall {
                    tool_call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    arguments: call.arguments.clone(),
                })
                .await;

            let result_content = match before_outcome.blocked {
                Some(reason) => reason,
                None => self.dispatch_tool_call(call).await,
            };

            let after_outcome = self
                .emit(Event::AfterToolResult {
                    tool_call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    result: result_content.clone(),
                })
                .await;
            let final_content = after_outcome.replaced_result.unwrap_or(result_content);

            self.emit_stream(StreamEvent::ToolResult { tool_call_id: call.id.clone(), content: final_content.clone() });
            self.append_history(AgentMessage::tool_result(call.id.clone(), final_content));

            if let Some(steering_message) = self.pop_steer() {
                self.append_history(AgentMessage::user(steering_message));
                debug!(tool_call_id = %call.id, "steering message received; cancelling remaining tool calls this turn");
                return;
            }
        }
    }

    async fn dispatch_tool_call(&self, call: &ToolCall) -> String {
        let params: Value = match serde_json::from_str(&call.arguments) {
            Ok(value) => value,
            Err(error) => return format!("invalid tool arguments: {error}"),
        };

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<String>();
        let events = self.events.clone();
        let call_id = call.id.clone();
        let child_id = self.child_id.clone();
        let pump = tokio::spawn(async move {
            while let Some(chunk) = rx.recv().await {
                let event = Event::ToolExecutionUpdate { tool_call_id: call_id.clone(), chunk };
                match &child_id {
                    Some(id) => {
                        let span = tracing::debug_span!("child_agent", child_id = %id);
                        events.emit(event).instrument(span).await;
                    }
                    None => {
                        events.emit(event).await;
                    }
                }
            }
        });

        let on_output: OutputSink = Arc::new(move |line: &str| {
            let _ = tx.send(line.to_string());
        });
        let ctx = ToolContext::new(self.cwd.clone(), self.abort_signal.clone())
            .with_env(self.active_env())
            .with_on_output(on_output);

        let result = dispatch(&self.tools, &call.name, params, &ctx, self.allowed_tools().as_deref()).await;
        drop(ctx);
        let _ = pump.await;

        match result {
            Ok(output) => output.content,
            Err(error) => format!("error: {error}"),
        }
    }
}

struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

struct ModelGuard<'a> {
    runner: &'a AgentRunner,
    previous: Option<String>,
}

impl Drop for ModelGuard<'_> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            self.runner.lock_state().current_model = previous;
        }
    }
}

struct AllowedToolsGuard<'a> {
    runner: &'a AgentRunner,
    previous: Option<Vec<String>>,
}

impl Drop for AllowedToolsGuard<'_> {
    fn drop(&mut self) {
        self.runner.lock_state().allowed_tools = self.previous.take();
    }
}

struct EnvGuard<'a> {
    runner: &'a AgentRunner,
    previous: Option<std::collections::HashMap<String, String>>,
}

impl Drop for EnvGuard<'_> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            self.runner.lock_state().active_env = previous;
        }
    }
}

#[async_trait]
impl ForkExecutor for AgentRunner {
    async fn run_fork(&self, skill_name: &str, arguments: &str) -> std::result::Result<String, ToolError> {
        self.execute_fork(skill_name, arguments)
            .await
            .map_err(|error| ToolError::ExecutionFailed(error.to_string()))
    }
}

/// Resolves the circular dependency between the `skill` tool (which needs a
/// `ForkExecutor`) and the runner (which isn't built yet when the tool
/// registry is assembled): bind a weak back-reference into the runner once
/// it exists, rather than have the runner own its own tool registry's
/// construction.
struct ForkHandle(OnceLock<Weak<AgentRunner>>);

impl ForkHandle {
    fn new() -> Arc<Self> {
        Arc::new(ForkHandle(OnceLock::new()))
    }

    fn bind(&self, runner: &Arc<AgentRunner>) {
        let _ = self.0.set(Arc::downgrade(runner));
    }
}

#[async_trait]
impl ForkExecutor for ForkHandle {
    async fn run_fork(&self, skill_name: &str, arguments: &str) -> std::result::Result<String, ToolError> {
        let runner = self
            .0
            .get()
            .and_then(Weak::upgrade)
            .ok_or_else(|| ToolError::ExecutionFailed("agent runner not yet initialised".into()))?;
        <AgentRunner as ForkExecutor>::run_fork(runner.as_ref(), skill_name, arguments).await
    }
}

/// Assemble a runner with the `skill` tool wired into its registry,
/// including `execute`/`execute_script`/`read`/`write`. This is the
/// intended construction path; `AgentRunner::new` alone leaves the `skill`
/// tool unregistered.
pub fn build_agent_runner(
    config: AgentConfig,
    adapter: Arc<dyn Adapter>,
    engine: Arc<SkillEngine>,
    events: Arc<EventBus>,
    context: Arc<ContextManager>,
    cwd: PathBuf,
) -> Arc<AgentRunner> {
    let fork_handle = ForkHandle::new();

    let mut registry = ToolRegistry::with_builtins();
    registry.register(Arc::new(SkillTool::new(engine.clone(), fork_handle.clone())) as Arc<dyn Tool>);
    let tools = Arc::new(registry);

    let runner = Arc::new(AgentRunner::new(config, adapter, engine, tools, events, context, cwd));
    fork_handle.bind(&runner);
    runner
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SlidingWindow;
    use crate::skills::{PromptFormat, SkillLoadOptions};
    use futures::stream;

    struct ScriptedAdapter {
        turns: Mutex<VecDeque<Vec<AdapterEvent>>>,
    }

    impl ScriptedAdapter {
        fn new(turns: Vec<Vec<AdapterEvent>>) -> Self {
            ScriptedAdapter { turns: Mutex::new(turns.into()) }
        }
    }

    #[async_trait]
    impl Adapter for ScriptedAdapter {
        async fn stream(
            &self,
            _messages: &[LLMMessage],
            _tools: &[ToolSchema],
            _model: &str,
            _temperature: Option<f32>,
            _max_tokens: Option<u32>,
            _abort: AbortSignal,
        ) -> Result<AdapterStream> {
            let next = self.turns.lock().unwrap().pop_front().unwrap_or_default();
            Ok(Box::pin(stream::iter(next)) as AdapterStream)
        }
    }

    /// An adapter whose stream yields one text delta, then sleeps past the
    /// point a concurrently-firing `abort()` lands, then yields a second
    /// delta the runner must never see or append.
    struct StallingAdapter;

    #[async_trait]
    impl Adapter for StallingAdapter {
        async fn stream(
            &self,
            _messages: &[LLMMessage],
            _tools: &[ToolSchema],
            _model: &str,
            _temperature: Option<f32>,
            _max_tokens: Option<u32>,
            _abort: AbortSignal,
        ) -> Result<AdapterStream> {
            let events = stream::unfold(0u8, |state| async move {
                match state {
                    0 => Some((AdapterEvent::TextDelta("partial".into()), 1)),
                    1 => {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Some((AdapterEvent::TextDelta(" should never land".into()), 2))
                    }
                    _ => None,
                }
            });
            Ok(Box::pin(events) as AdapterStream)
        }
    }

    fn text_turn(text: &str) -> Vec<AdapterEvent> {
        vec![
            AdapterEvent::TextDelta(text.to_string()),
            AdapterEvent::Finish { reason: AdapterFinishReason::Complete },
        ]
    }

    fn tool_call_turn(id: &str, name: &str, args: &str) -> Vec<AdapterEvent> {
        vec![
            AdapterEvent::ToolCallStart { id: id.to_string(), name: name.to_string() },
            AdapterEvent::ToolCallDelta { id: id.to_string(), args_delta: args.to_string() },
            AdapterEvent::ToolCallEnd { id: id.to_string() },
            AdapterEvent::Finish { reason: AdapterFinishReason::ToolCalls },
        ]
    }

    fn test_runner(adapter: ScriptedAdapter, max_turns: u32) -> Arc<AgentRunner> {
        test_runner_with_adapter(adapter, max_turns)
    }

    fn test_runner_with_adapter(adapter: impl Adapter + 'static, max_turns: u32) -> Arc<AgentRunner> {
        let tmp = tempfile::tempdir().unwrap();
        let opts = SkillLoadOptions {
            bundled_dir: None,
            managed_dir: None,
            workspace_dir: Some(tmp.path().to_path_buf()),
            extra_dirs: Vec::new(),
            include_claude_skills: false,
            include_cursor_skills: false,
        };
        let engine = Arc::new(SkillEngine::new(opts, crate::config::SkillsConfig::default(), PromptFormat::StructuredTag, None));
        let events = Arc::new(EventBus::new());
        let context = Arc::new(ContextManager::new(1_000_000, 0, Box::new(SlidingWindow)));
        let config = AgentConfig { model: "test-model".into(), max_turns, ..Default::default() };

        build_agent_runner(config, Arc::new(adapter), engine, events, context, std::env::temp_dir())
    }

    #[tokio::test]
    async fn chat_returns_the_final_assistant_message_on_natural_completion() {
        let runner = test_runner(ScriptedAdapter::new(vec![text_turn("hello there")]), 10);
        let outcome = runner.chat("hi").await.unwrap();
        assert_eq!(outcome.finish_reason, FinishReason::Complete);
        assert_eq!(outcome.message.content, "hello there");
    }

    #[tokio::test]
    async fn chat_dispatches_a_tool_call_then_completes() {
        let runner = test_runner(
            ScriptedAdapter::new(vec![
                tool_call_turn("c1", "execute", r#"{"command": "echo hi"}"#),
                text_turn("done"),
            ]),
            10,
        );
        let outcome = runner.chat("run something").await.unwrap();
        assert_eq!(outcome.finish_reason, FinishReason::Complete);
        assert_eq!(outcome.message.content, "done");

        let history = runner.history();
        assert!(history.iter().any(|m| m.role == Role::Tool && m.content.contains("hi")));
    }

    #[tokio::test]
    async fn chat_stops_at_max_turns_when_the_model_keeps_calling_tools() {
        let runner = test_runner(
            ScriptedAdapter::new(vec![
                tool_call_turn("c1", "execute", r#"{"command": "echo 1"}"#),
                tool_call_turn("c2", "execute", r#"{"command": "echo 2"}"#),
            ]),
            2,
        );
        let outcome = runner.chat("loop forever").await.unwrap();
        assert_eq!(outcome.finish_reason, FinishReason::MaxTurns);
    }

    #[tokio::test]
    async fn sequential_chat_calls_both_succeed_once_busy_flag_clears() {
        let runner = test_runner(ScriptedAdapter::new(vec![text_turn("first"), text_turn("second")]), 10);
        let first = runner.chat("hi").await.unwrap();
        assert_eq!(first.message.content, "first");
        let second = runner.chat("again").await.unwrap();
        assert_eq!(second.message.content, "second");
    }

    #[tokio::test]
    async fn abort_before_chat_yields_aborted_finish_reason() {
        let runner = test_runner(ScriptedAdapter::new(vec![text_turn("never seen")]), 10);
        runner.abort();
        let outcome = runner.chat("hi").await.unwrap();
        assert_eq!(outcome.finish_reason, FinishReason::Aborted);
    }

    #[tokio::test]
    async fn abort_mid_stream_discards_the_partial_assistant_message() {
        let runner = test_runner_with_adapter(StallingAdapter, 10);
        let runner_for_abort = runner.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            runner_for_abort.abort();
        });

        let outcome = runner.chat("hi").await.unwrap();
        assert_eq!(outcome.finish_reason, FinishReason::Aborted);
        assert!(outcome.message.content.is_empty());

        let history = runner.history();
        assert!(history.iter().all(|m| m.role != Role::Assistant));
    }

    #[tokio::test]
    async fn steer_is_appended_and_cancels_remaining_tool_calls_in_the_batch() {
        // Two tool calls in one turn; steering queued before chat() runs
        // means only the first call's result should land before the
        // steering message cancels the rest of the batch.
        let runner = test_runner(
            ScriptedAdapter::new(vec![
                vec![
                    AdapterEvent::ToolCallStart { id: "c1".into(), name: "execute".into() },
                    AdapterEvent::ToolCallDelta { id: "c1".into(), args_delta: r#"{"command": "echo 1"}"#.into() },
                    AdapterEvent::ToolCallEnd { id: "c1".into() },
                    AdapterEvent::ToolCallStart { id: "c2".into(), name: "execute".into() },
                    AdapterEvent::ToolCallDelta { id: "c2".into(), args_delta: r#"{"command": "echo 2"}"#.into() },
                    AdapterEvent::ToolCallEnd { id: "c2".into() },
                    AdapterEvent::Finish { reason: AdapterFinishReason::ToolCalls },
                ],
                text_turn("acknowledged"),
            ]),
            10,
        );
        runner.steer("stop and look at this instead");
        let outcome = runner.chat("run two things").await.unwrap();
        assert_eq!(outcome.finish_reason, FinishReason::Complete);

        let history = runner.history();
        let tool_results = history.iter().filter(|m| m.role == Role::Tool).count();
        assert_eq!(tool_results, 1, "second tool call should have been cancelled by steering");
        assert!(history.iter().any(|m| m.role == Role::User && m.content.contains("stop and look")));
    }
}
