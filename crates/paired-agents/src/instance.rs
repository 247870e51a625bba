//! A running agent: definition, behavior and per-task pipeline.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::Arc,
};

use chrono::Utc;
use paired_core::{
    LifecycleEvent, TaskContext,
    traits::{HandoffPackage, KnowledgeStore, PatternObservation, TaskRecord},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::{
    sync::{Mutex, mpsc},
    time::Instant,
};

use crate::{
    behavior::{AgentBehavior, ExecutionMode},
    definition::{AgentDefinition, CompiledRule},
    error::ExecutionError,
    runtime::{
        Enrichment, ExecutionMetrics, ExecutionOutput, LearningStore, RuntimeConfig, Strategy, Task,
        TaskOutcome, TaskReport, TaskState, analysis,
        handoff::{self, HandoffDraft, ReceivedHandoff},
        strategy,
    },
};

/// Instance status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    /// No task in flight.
    Ready,
    /// At least one task in flight.
    Busy,
    /// Shut down; new tasks fail.
    Stopped,
}

/// Performance counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStats {
    pub tasks: u64,
    pub completed: u64,
    pub failed: u64,
    pub handed_off: u64,
    pub total_duration_ms: u64,
    pub mean_duration_ms: u64,
}

impl AgentStats {
    fn record(&mut self, report: &TaskReport) {
        self.tasks += 1;
        match report.state {
            TaskState::HandedOff => {
                self.completed += 1;
                self.handed_off += 1;
            }
            TaskState::Completed => self.completed += 1,
            _ => self.failed += 1,
        }
        self.total_duration_ms += report.duration_ms;
        self.mean_duration_ms = self.total_duration_ms / self.tasks;
    }
}

#[derive(Default)]
struct State {
    current: HashSet<String>,
    stats: AgentStats,
    learning: LearningStore,
    recent_work: VecDeque<String>,
    received: Vec<ReceivedHandoff>,
    stopped: bool,
}

/// An instantiated agent.
///
/// Tasks run concurrently; the lock only guards bookkeeping.
pub struct AgentInstance {
    definition: AgentDefinition,
    rules: Vec<CompiledRule>,
    behavior: Arc<dyn AgentBehavior>,
    config: RuntimeConfig,
    events: mpsc::UnboundedSender<LifecycleEvent>,
    state: Mutex<State>,
}

impl AgentInstance {
    /// Create an instance. Lifecycle events go to `events`.
    #[must_use]
    pub fn new(
        definition: AgentDefinition,
        rules: Vec<CompiledRule>,
        behavior: Arc<dyn AgentBehavior>,
        config: RuntimeConfig,
        events: mpsc::UnboundedSender<LifecycleEvent>,
    ) -> Self {
        Self {
            definition,
            rules,
            behavior,
            config,
            events,
            state: Mutex::new(State::default()),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.definition.id
    }

    #[must_use]
    pub const fn definition(&self) -> &AgentDefinition {
        &self.definition
    }

    /// Compiled routing rules.
    #[must_use]
    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    /// Name of the resolved behavior.
    #[must_use]
    pub fn behavior_name(&self) -> &'static str {
        self.behavior.name()
    }

    pub async fn status(&self) -> InstanceStatus {
        let state = self.state.lock().await;
        if state.stopped {
            InstanceStatus::Stopped
        } else if state.current.is_empty() {
            InstanceStatus::Ready
        } else {
            InstanceStatus::Busy
        }
    }

    pub async fn stats(&self) -> AgentStats {
        self.state.lock().await.stats
    }

    /// Ids of tasks in flight.
    pub async fn current_tasks(&self) -> Vec<String> {
        self.state.lock().await.current.iter().cloned().collect()
    }

    /// Learned patterns and error counters.
    pub async fn learning(&self) -> LearningStore {
        self.state.lock().await.learning.clone()
    }

    /// Handoffs folded into this agent.
    pub async fn received_handoffs(&self) -> Vec<ReceivedHandoff> {
        self.state.lock().await.received.clone()
    }

    /// Mark stopped. Returns false if already stopped.
    pub(crate) async fn stop(&self) -> bool {
        let mut state = self.state.lock().await;
        !std::mem::replace(&mut state.stopped, true)
    }

    fn emit(&self, event: LifecycleEvent) {
        let _ = self.events.send(event); // forwarder gone after shutdown
    }

    /// Run a task through the full pipeline.
    ///
    /// Never fails: errors are returned as a `Failed` outcome with a
    /// recovery suggestion.
    pub async fn execute(&self, request: &str, context: TaskContext, knowledge: &dyn KnowledgeStore) -> TaskReport {
        let started = Instant::now();
        let mut task = Task::new(self.id(), request, context);

        {
            let mut state = self.state.lock().await;
            if state.stopped {
                drop(state);
                let error = ExecutionError::Other(format!("agent {} is shut down", self.id()));
                let _ = task.advance(TaskState::Failed);
                return self.report(task, TaskOutcome::failed(&error), None, 0);
            }
            state.current.insert(task.id.clone());
        }

        self.accept_handoffs(knowledge).await;
        tracing::debug!(agent_id = self.id(), task_id = %task.id, "Task received");

        let result = self.run(&mut task, knowledge).await;
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let (outcome, package, error) = match result {
            Ok((mut output, package)) => {
                output.metrics.duration_ms = duration_ms;
                (TaskOutcome::Completed { output }, package, None)
            }
            Err(e) => {
                if !task.state.is_terminal() {
                    let _ = task.advance(TaskState::Failed);
                }
                (TaskOutcome::failed(&e), None, Some(e))
            }
        };
        let report = self.report(task, outcome, package, duration_ms);
        self.post_process(request, &report, error.as_ref(), knowledge).await;
        report
    }

    /// Fold pending handoffs before accepting the task.
    async fn accept_handoffs(&self, knowledge: &dyn KnowledgeStore) {
        let packages = match knowledge.take_handoffs(self.id()).await {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(agent_id = self.id(), "Failed to read pending handoffs: {e}");
                return;
            }
        };
        if packages.is_empty() {
            return;
        }

        let mut accepted = Vec::with_capacity(packages.len());
        {
            let mut state = self.state.lock().await;
            for package in packages {
                let received = ReceivedHandoff::accept(package);
                accepted.push(received.package_id.clone());
                state.received.push(received);
            }
        }
        for package_id in accepted {
            tracing::info!(agent_id = self.id(), package_id = %package_id, "Handoff accepted");
            self.emit(LifecycleEvent::HandoffAccepted {
                package_id,
                agent_id: self.id().to_string(),
            });
        }
    }

    async fn run(
        &self,
        task: &mut Task,
        knowledge: &dyn KnowledgeStore,
    ) -> Result<(ExecutionOutput, Option<HandoffPackage>), ExecutionError> {
        task.enrichment = Some(self.enrich(task, knowledge).await);
        task.advance(TaskState::ContextEnriched)?;

        let mut analysis = analysis::analyze(&task.request, &task.context);
        self.behavior.analyze(&task.request, &mut analysis);
        tracing::debug!(
            agent_id = self.id(),
            task_id = %task.id,
            complexity = analysis.complexity,
            risk = analysis.risk,
            effort = analysis.effort,
            "Task analyzed"
        );
        task.analysis = Some(analysis.clone());
        task.advance(TaskState::Analyzed)?;

        let request = task.request.clone();
        let chosen = strategy::select(
            &analysis,
            || self.behavior.handoff_target(&request, &analysis),
            || self.behavior.collaborators(&request, &analysis),
        );
        tracing::debug!(agent_id = self.id(), task_id = %task.id, strategy = chosen.name(), "Strategy selected");
        task.strategy = Some(chosen.clone());
        task.advance(TaskState::StrategySelected)?;

        task.advance(TaskState::Executing)?;
        let dispatched = self.dispatch(task, &chosen, knowledge);
        let (output, package) = match self.config.task_timeout {
            Some(limit) => tokio::time::timeout(limit, dispatched)
                .await
                .map_err(|_| ExecutionError::Timeout(format!("task exceeded {}s", limit.as_secs())))??,
            None => dispatched.await?,
        };

        task.advance(TaskState::Completed)?;
        if package.is_some() {
            task.advance(TaskState::HandedOff)?;
        }
        Ok((output, package))
    }

    async fn enrich(&self, task: &Task, knowledge: &dyn KnowledgeStore) -> Enrichment {
        let memory = match knowledge.recall(&task.request, self.config.recall_limit).await {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(agent_id = self.id(), "Memory recall failed, continuing without: {e}");
                Vec::new()
            }
        };
        let project = task.context.project_path.as_deref();
        let handoff_notes = self
            .state
            .lock()
            .await
            .received
            .iter()
            .filter(|r| r.concerns(project))
            .flat_map(|r| r.notes.iter().cloned())
            .collect();

        Enrichment {
            agent_id: self.definition.id.clone(),
            agent_name: self.definition.name.clone(),
            role: self.definition.role.clone(),
            expertise: self.definition.expertise.clone(),
            memory,
            handoff_notes,
            enriched_at: Utc::now(),
        }
    }

    async fn dispatch(
        &self,
        task: &Task,
        chosen: &Strategy,
        knowledge: &dyn KnowledgeStore,
    ) -> Result<(ExecutionOutput, Option<HandoffPackage>), ExecutionError> {
        let output = |payload: Value, collaborators: Vec<String>| ExecutionOutput {
            method: chosen.name().to_string(),
            metrics: ExecutionMetrics {
                duration_ms: 0,
                steps: count_steps(&payload),
                collaborators,
            },
            payload,
        };

        match chosen {
            Strategy::Lightweight => {
                let payload = self.behavior.execute(ExecutionMode::Lightweight, task).await?;
                Ok((output(payload, Vec::new()), None))
            }
            Strategy::Full => {
                let payload = self.behavior.execute(ExecutionMode::Full, task).await?;
                Ok((output(payload, Vec::new()), None))
            }
            Strategy::Hybrid => {
                let (light, full) = tokio::try_join!(
                    self.behavior.execute(ExecutionMode::Lightweight, task),
                    self.behavior.execute(ExecutionMode::Full, task),
                )?;
                Ok((output(json!({ "lightweight": light, "full": full }), Vec::new()), None))
            }
            Strategy::Collaboration { partners } => {
                let mut payload = self.behavior.execute(ExecutionMode::Full, task).await?;
                if let Some(obj) = payload.as_object_mut() {
                    obj.insert("collaborators".to_string(), json!(partners));
                }
                Ok((output(payload, partners.clone()), None))
            }
            Strategy::Handoff { target, reason } => {
                let package = self.hand_off(task, target, reason, knowledge).await?;
                let payload = json!({
                    "handoff_id": package.id,
                    "target": package.to_agent,
                    "reason": package.reason,
                });
                Ok((output(payload, Vec::new()), Some(package)))
            }
        }
    }

    async fn hand_off(
        &self,
        task: &Task,
        target: &str,
        reason: &str,
        knowledge: &dyn KnowledgeStore,
    ) -> Result<HandoffPackage, ExecutionError> {
        let recent_work = self.state.lock().await.recent_work.iter().cloned().collect();
        let fallback = analysis::analyze(&task.request, &task.context);
        let package = handoff::package(HandoffDraft {
            from_agent: self.id(),
            to_agent: target,
            project_path: task.context.project_path.clone(),
            task_id: &task.id,
            request: &task.request,
            reason,
            analysis: task.analysis.as_ref().unwrap_or(&fallback),
            recent_work,
            memory: task.memory().to_vec(),
        });
        knowledge.save_handoff(&package).await?;

        tracing::info!(
            agent_id = self.id(),
            task_id = %task.id,
            package_id = %package.id,
            target,
            "Task handed off"
        );
        self.emit(LifecycleEvent::HandoffCreated {
            package_id: package.id.clone(),
            from_agent: self.id().to_string(),
            to_agent: target.to_string(),
        });
        Ok(package)
    }

    fn report(&self, task: Task, outcome: TaskOutcome, handoff: Option<HandoffPackage>, duration_ms: u64) -> TaskReport {
        TaskReport {
            task_id: task.id,
            agent_id: self.definition.id.clone(),
            state: task.state,
            strategy: task.strategy,
            analysis: task.analysis,
            outcome,
            handoff,
            duration_ms,
            history: task.history,
        }
    }

    /// Update counters and learning, persist significant work, emit the result.
    async fn post_process(
        &self,
        request: &str,
        report: &TaskReport,
        error: Option<&ExecutionError>,
        knowledge: &dyn KnowledgeStore,
    ) {
        let strategy = report.strategy.as_ref().map_or("none", Strategy::name);
        let capabilities = report
            .analysis
            .as_ref()
            .map(|a| a.required_capabilities.clone())
            .unwrap_or_default();

        let confidence = {
            let mut state = self.state.lock().await;
            state.current.remove(&report.task_id);
            state.stats.record(report);
            state.learning.record(strategy, &capabilities, report.is_success(), request);
            if let Some(e) = error {
                state.learning.record_error(e.kind());
            }
            if report.is_success() {
                if state.recent_work.len() == self.config.recent_work_limit.max(1) {
                    state.recent_work.pop_front();
                }
                state.recent_work.push_back(format!("[{strategy}] {}", summarize(request)));
            }
            state
                .learning
                .pattern(&format!("strategy:{strategy}"))
                .map_or(0.0, crate::runtime::learning::PatternStats::success_rate)
        };

        let mut context = HashMap::new();
        if let Some(a) = report.analysis.as_ref() {
            context.insert("complexity".to_string(), a.complexity.to_string());
            context.insert("risk".to_string(), a.risk.to_string());
        }
        let pattern_type = error.map_or_else(|| strategy.to_string(), |e| format!("error:{}", e.kind().as_str()));
        let observation = PatternObservation {
            agent_id: self.id().to_string(),
            pattern_type,
            context,
            outcome: if report.is_success() { "success" } else { "failure" }.to_string(),
            confidence,
            tags: capabilities,
            timestamp: Utc::now(),
        };
        if let Err(e) = knowledge.record_pattern(observation).await {
            tracing::warn!(agent_id = self.id(), "Failed to record pattern: {e}");
        }

        if let Some(analysis) = report.analysis.as_ref().filter(|a| self.config.is_significant(a)) {
            let record = TaskRecord {
                task_id: report.task_id.clone(),
                agent_id: self.id().to_string(),
                request: request.to_string(),
                strategy: strategy.to_string(),
                complexity: analysis.complexity,
                risk: analysis.risk,
                effort: analysis.effort,
                success: report.is_success(),
                summary: summary_of(&report.outcome),
                duration_ms: report.duration_ms,
                timestamp: Utc::now(),
            };
            if let Err(e) = knowledge.record_task(record).await {
                tracing::warn!(agent_id = self.id(), task_id = %report.task_id, "Failed to persist task: {e}");
            }
        }

        match (&report.outcome, error) {
            (TaskOutcome::Completed { .. }, _) => {
                tracing::info!(
                    agent_id = self.id(),
                    task_id = %report.task_id,
                    strategy,
                    duration_ms = report.duration_ms,
                    "Task completed"
                );
                self.emit(LifecycleEvent::TaskCompleted {
                    agent_id: self.id().to_string(),
                    task_id: report.task_id.clone(),
                    strategy: strategy.to_string(),
                    duration_ms: report.duration_ms,
                });
            }
            (TaskOutcome::Failed { error_kind, .. }, e) => {
                tracing::warn!(
                    agent_id = self.id(),
                    task_id = %report.task_id,
                    error_kind = error_kind.as_str(),
                    "Task failed: {}",
                    e.map(ToString::to_string).unwrap_or_default()
                );
                self.emit(LifecycleEvent::TaskFailed {
                    agent_id: self.id().to_string(),
                    task_id: report.task_id.clone(),
                    error_kind: error_kind.as_str().to_string(),
                });
            }
        }
    }
}

fn count_steps(payload: &Value) -> u32 {
    let steps = |v: &Value| v.get("steps").and_then(Value::as_array).map_or(0, Vec::len);
    let total = steps(payload)
        + payload.get("lightweight").map_or(0, steps)
        + payload.get("full").map_or(0, steps);
    u32::try_from(total).unwrap_or(u32::MAX)
}

fn summarize(request: &str) -> String {
    const MAX: usize = 120;
    if request.chars().count() <= MAX {
        request.to_string()
    } else {
        let cut: String = request.chars().take(MAX).collect();
        format!("{cut}...")
    }
}

fn summary_of(outcome: &TaskOutcome) -> String {
    match outcome {
        TaskOutcome::Completed { output } => output
            .payload
            .get("summary")
            .and_then(Value::as_str)
            .map_or_else(|| format!("completed via {}", output.method), ToString::to_string),
        TaskOutcome::Failed { message, .. } => format!("failed: {message}"),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use paired_core::InMemoryKnowledge;

    use super::*;
    use crate::{
        behavior::{BehaviorTable, GenericBehavior},
        definition::compile_rules,
        error::{ErrorKind, RecoveryAction},
        runtime::TaskAnalysis,
    };

    const ARCHITECT: &str = r#"
id = "architect"
name = "Leonardo"
role = "Architecture"
version = "1.0.0"
expertise = ["system design"]

[[routing]]
pattern = "deploy"
action = "handoff"
target = "devops"

[[routing]]
pattern = "test"
action = "collaborate"
target = "qa"
"#;

    fn instance_with(
        config: RuntimeConfig,
        behavior: Option<Arc<dyn AgentBehavior>>,
    ) -> (AgentInstance, mpsc::UnboundedReceiver<LifecycleEvent>) {
        let def = AgentDefinition::from_toml(ARCHITECT, None).unwrap();
        let rules = compile_rules(&def).unwrap();
        let behavior = behavior.unwrap_or_else(|| BehaviorTable::new().resolve(&def.id)(&def, &rules));
        let (tx, rx) = mpsc::unbounded_channel();
        (AgentInstance::new(def, rules, behavior, config, tx), rx)
    }

    fn instance() -> (AgentInstance, mpsc::UnboundedReceiver<LifecycleEvent>) {
        instance_with(RuntimeConfig::default(), None)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<LifecycleEvent>) -> Vec<LifecycleEvent> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    struct Failing;

    #[async_trait]
    impl AgentBehavior for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }
        fn handoff_target(&self, _: &str, _: &TaskAnalysis) -> Option<strategy::HandoffDirective> {
            None
        }
        fn collaborators(&self, _: &str, _: &TaskAnalysis) -> Option<Vec<String>> {
            None
        }
        async fn execute(&self, _: ExecutionMode, _: &Task) -> Result<Value, ExecutionError> {
            Err(ExecutionError::classify("EACCES: permission denied"))
        }
    }

    struct Stalled;

    #[async_trait]
    impl AgentBehavior for Stalled {
        fn name(&self) -> &'static str {
            "stalled"
        }
        fn handoff_target(&self, _: &str, _: &TaskAnalysis) -> Option<strategy::HandoffDirective> {
            None
        }
        fn collaborators(&self, _: &str, _: &TaskAnalysis) -> Option<Vec<String>> {
            None
        }
        async fn execute(&self, _: ExecutionMode, _: &Task) -> Result<Value, ExecutionError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Value::Null)
        }
    }

    #[tokio::test]
    async fn test_simple_task_runs_lightweight() {
        let (agent, mut rx) = instance();
        let knowledge = InMemoryKnowledge::new();

        let report = agent.execute("rename a variable", TaskContext::default(), &knowledge).await;

        assert!(report.is_success());
        assert_eq!(report.state, TaskState::Completed);
        assert_eq!(report.strategy, Some(Strategy::Lightweight));
        assert_eq!(
            report.history,
            vec![
                TaskState::Received,
                TaskState::ContextEnriched,
                TaskState::Analyzed,
                TaskState::StrategySelected,
                TaskState::Executing,
                TaskState::Completed,
            ]
        );
        // not significant, so only the pattern is recorded
        assert!(knowledge.tasks().await.is_empty());
        assert_eq!(knowledge.patterns().await.len(), 1);
        assert_eq!(agent.stats().await.completed, 1);
        assert_eq!(agent.status().await, InstanceStatus::Ready);
        assert!(matches!(drain(&mut rx).as_slice(), [LifecycleEvent::TaskCompleted { .. }]));
    }

    #[tokio::test]
    async fn test_significant_task_is_persisted() {
        let (agent, _rx) = instance();
        let knowledge = InMemoryKnowledge::new();
        let request = "Refactor the database architecture for performance and security";
        let ctx = TaskContext::default().with_attachment("schema.sql").with_attachment("erd.png");

        let report = agent.execute(request, ctx, &knowledge).await;

        assert!(report.is_success());
        assert_eq!(report.strategy, Some(Strategy::Full));
        let tasks = knowledge.tasks().await;
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].strategy, "full");
        assert!(tasks[0].summary.contains("Architecture plan"));
    }

    #[tokio::test]
    async fn test_handoff_creates_package_and_receiver_folds_it() {
        let (agent, mut rx) = instance();
        let knowledge = InMemoryKnowledge::new();
        let ctx = TaskContext::default().with_environment("production");

        let report = agent
            .execute("deploy the refactored database migration", ctx, &knowledge)
            .await;

        assert_eq!(report.state, TaskState::HandedOff);
        assert_eq!(report.handoff_target(), Some("devops"));
        assert_eq!(knowledge.pending_handoffs().await.len(), 1);
        assert!(
            drain(&mut rx)
                .iter()
                .any(|e| matches!(e, LifecycleEvent::HandoffCreated { to_agent, .. } if to_agent == "devops"))
        );

        let devops_def = AgentDefinition::from_toml(
            "id = \"devops\"\nname = \"Ops\"\nrole = \"Operations\"\nversion = \"1.0.0\"",
            None,
        )
        .unwrap();
        let (tx, mut devops_rx) = mpsc::unbounded_channel();
        let devops = AgentInstance::new(
            devops_def.clone(),
            vec![],
            GenericBehavior::construct(&devops_def, &[]),
            RuntimeConfig::default(),
            tx,
        );
        let follow_up = devops.execute("check status", TaskContext::default(), &knowledge).await;

        assert!(follow_up.is_success());
        assert_eq!(devops.received_handoffs().await.len(), 1);
        assert!(knowledge.pending_handoffs().await.is_empty());
        let events = drain(&mut devops_rx);
        assert!(matches!(events.first(), Some(LifecycleEvent::HandoffAccepted { .. })));
    }

    #[tokio::test]
    async fn test_collaboration_lists_partners() {
        let (agent, _rx) = instance();
        let knowledge = InMemoryKnowledge::new();
        let report = agent
            .execute("Refactor the distributed test harness architecture", TaskContext::default(), &knowledge)
            .await;

        let Some(Strategy::Collaboration { partners }) = report.strategy.clone() else {
            panic!("expected collaboration, got {:?}", report.strategy);
        };
        assert_eq!(partners, vec!["qa".to_string()]);
        let TaskOutcome::Completed { output } = report.outcome else {
            panic!("expected completion");
        };
        assert_eq!(output.metrics.collaborators, vec!["qa".to_string()]);
    }

    #[tokio::test]
    async fn test_failure_is_an_envelope() {
        let (agent, mut rx) = instance_with(RuntimeConfig::default(), Some(Arc::new(Failing)));
        let knowledge = InMemoryKnowledge::new();

        let report = agent.execute("rename a variable", TaskContext::default(), &knowledge).await;

        assert_eq!(report.state, TaskState::Failed);
        let TaskOutcome::Failed { error_kind, recovery, .. } = report.outcome else {
            panic!("expected failure");
        };
        assert_eq!(error_kind, ErrorKind::Permission);
        assert_eq!(recovery, RecoveryAction::Escalate);
        assert_eq!(agent.learning().await.error_count(ErrorKind::Permission), 1);
        assert_eq!(agent.stats().await.failed, 1);
        assert!(agent.current_tasks().await.is_empty());
        assert_eq!(knowledge.patterns().await[0].pattern_type, "error:permission");
        assert!(matches!(drain(&mut rx).as_slice(), [LifecycleEvent::TaskFailed { .. }]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_timeout() {
        let config = RuntimeConfig {
            task_timeout: Some(Duration::from_secs(5)),
            ..RuntimeConfig::default()
        };
        let (agent, _rx) = instance_with(config, Some(Arc::new(Stalled)));
        let knowledge = InMemoryKnowledge::new();

        let report = agent.execute("rename a variable", TaskContext::default(), &knowledge).await;

        let TaskOutcome::Failed { error_kind, recovery, .. } = report.outcome else {
            panic!("expected timeout");
        };
        assert_eq!(error_kind, ErrorKind::Timeout);
        assert_eq!(recovery, RecoveryAction::Retry);
    }

    #[tokio::test]
    async fn test_stopped_instance_rejects_tasks() {
        let (agent, _rx) = instance();
        assert!(agent.stop().await);
        assert!(!agent.stop().await);

        let report = agent
            .execute("rename a variable", TaskContext::default(), &InMemoryKnowledge::new())
            .await;
        assert!(!report.is_success());
        assert_eq!(agent.status().await, InstanceStatus::Stopped);
    }
}
