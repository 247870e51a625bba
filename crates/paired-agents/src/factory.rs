//! Agent registry and factory.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use paired_core::{EventBus, LifecycleEvent, TaskContext};
use serde::{Deserialize, Serialize};
use tokio::{
    sync::{RwLock, mpsc},
    task::JoinHandle,
};
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::{
    behavior::BehaviorTable,
    definition::{AgentDefinition, DefinitionOverride, compile_rules},
    error::RegistryError,
    instance::AgentInstance,
    loader,
    router::{self, RouteDecision},
    runtime::RuntimeConfig,
};

/// Per-agent result of `initialize_all`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InitStatus {
    Success,
    Failed { reason: String },
    Skipped { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitOutcome {
    pub agent_id: String,
    #[serde(flatten)]
    pub status: InitStatus,
}

#[derive(Default)]
struct Definitions {
    /// Ids in load order.
    order: Vec<String>,
    by_id: HashMap<String, AgentDefinition>,
}

impl Definitions {
    fn insert(&mut self, definition: AgentDefinition) {
        if !self.by_id.contains_key(&definition.id) {
            self.order.push(definition.id.clone());
        }
        self.by_id.insert(definition.id.clone(), definition);
    }

    fn ordered(&self) -> impl Iterator<Item = &AgentDefinition> {
        self.order.iter().filter_map(|id| self.by_id.get(id))
    }
}

struct Registered {
    instance: Arc<AgentInstance>,
    forwarder: JoinHandle<()>,
}

/// Loads descriptors, instantiates agents and routes tasks to them.
pub struct AgentFactory {
    behaviors: BehaviorTable,
    config: RuntimeConfig,
    events: Arc<EventBus>,
    definitions: RwLock<Definitions>,
    instances: RwLock<HashMap<String, Registered>>,
}

impl AgentFactory {
    #[must_use]
    pub fn new(behaviors: BehaviorTable, config: RuntimeConfig, events: Arc<EventBus>) -> Self {
        Self {
            behaviors,
            config,
            events,
            definitions: RwLock::new(Definitions::default()),
            instances: RwLock::new(HashMap::new()),
        }
    }

    /// Replace the roster with every descriptor in `dir`.
    ///
    /// Fail-fast: on error the previous roster is kept untouched.
    ///
    /// # Errors
    /// Returns the first `Io` or `Validation` error.
    pub async fn load_definitions(&self, dir: &Path) -> Result<usize, RegistryError> {
        let loaded = loader::load_definitions(dir).await?;
        let count = loaded.len();

        let mut fresh = Definitions::default();
        for definition in loaded {
            fresh.insert(definition);
        }
        *self.definitions.write().await = fresh;
        Ok(count)
    }

    /// Add or replace a single definition.
    ///
    /// # Errors
    /// Returns `Validation` if the definition is malformed.
    pub async fn register_definition(&self, definition: AgentDefinition) -> Result<(), RegistryError> {
        definition.validate()?;
        self.definitions.write().await.insert(definition);
        Ok(())
    }

    /// Definitions in load order.
    pub async fn definitions(&self) -> Vec<AgentDefinition> {
        self.definitions.read().await.ordered().cloned().collect()
    }

    /// Instantiate an agent, replacing any running instance with the same id.
    ///
    /// # Errors
    /// Returns `NotFound` for unknown ids and `Instantiation` when the
    /// routing rules do not compile.
    pub async fn create_instance(
        &self,
        agent_id: &str,
        overrides: Option<&DefinitionOverride>,
    ) -> Result<Arc<AgentInstance>, RegistryError> {
        let mut definition = self
            .definitions
            .read()
            .await
            .by_id
            .get(agent_id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(agent_id.to_string()))?;
        if let Some(overrides) = overrides {
            definition.apply(overrides);
            definition.validate()?;
        }

        let rules = compile_rules(&definition)?;
        let behavior = self.behaviors.resolve(agent_id)(&definition, &rules);
        let behavior_name = behavior.name();

        let (tx, rx) = mpsc::unbounded_channel();
        let instance = Arc::new(AgentInstance::new(definition, rules, behavior, self.config.clone(), tx));
        let forwarder = Arc::clone(&self.events).spawn_forwarder(UnboundedReceiverStream::new(rx));

        self.shutdown_instance(agent_id).await;
        self.instances.write().await.insert(
            agent_id.to_string(),
            Registered {
                instance: Arc::clone(&instance),
                forwarder,
            },
        );

        tracing::info!(agent_id, behavior = behavior_name, "Agent initialized");
        self.events.emit(LifecycleEvent::AgentInitialized {
            agent_id: agent_id.to_string(),
        });
        Ok(instance)
    }

    /// Instantiate every active definition.
    ///
    /// One bad agent never blocks the rest: each gets its own outcome.
    pub async fn initialize_all(&self) -> Vec<InitOutcome> {
        let definitions = self.definitions().await;
        let mut outcomes = Vec::with_capacity(definitions.len());

        for definition in definitions {
            let status = if definition.is_active() {
                match self.create_instance(&definition.id, None).await {
                    Ok(_) => InitStatus::Success,
                    Err(e) => {
                        tracing::warn!(agent_id = %definition.id, "Agent failed to initialize: {e}");
                        InitStatus::Failed { reason: e.to_string() }
                    }
                }
            } else {
                InitStatus::Skipped {
                    reason: "declared inactive".to_string(),
                }
            };
            outcomes.push(InitOutcome {
                agent_id: definition.id,
                status,
            });
        }

        let ready = outcomes.iter().filter(|o| o.status == InitStatus::Success).count();
        tracing::info!(ready, total = outcomes.len(), "Agents initialized");
        outcomes
    }

    /// Best-fit running agent for a task, or `None` when nothing scores positive.
    pub async fn route(&self, description: &str, context: &TaskContext) -> Option<RouteDecision> {
        let text = router::routing_text(description, context);
        let running = self.list_instances().await;
        router::best(running.iter().map(|i| (i.definition(), i.rules())), &text)
    }

    pub async fn instance(&self, agent_id: &str) -> Option<Arc<AgentInstance>> {
        self.instances
            .read()
            .await
            .get(agent_id)
            .map(|r| Arc::clone(&r.instance))
    }

    /// Running instances in definition load order.
    pub async fn list_instances(&self) -> Vec<Arc<AgentInstance>> {
        let definitions = self.definitions.read().await;
        let instances = self.instances.read().await;

        let mut listed: Vec<Arc<AgentInstance>> = definitions
            .order
            .iter()
            .filter_map(|id| instances.get(id))
            .map(|r| Arc::clone(&r.instance))
            .collect();
        // instances whose definition was dropped by a reload come last
        let mut orphans: Vec<&String> = instances
            .keys()
            .filter(|id| !definitions.by_id.contains_key(*id))
            .collect();
        orphans.sort();
        listed.extend(orphans.into_iter().filter_map(|id| instances.get(id)).map(|r| Arc::clone(&r.instance)));
        listed
    }

    /// Stop and deregister an instance. Idempotent: false for unknown ids.
    pub async fn shutdown_instance(&self, agent_id: &str) -> bool {
        let Some(Registered { instance, forwarder }) = self.instances.write().await.remove(agent_id) else {
            return false;
        };
        instance.stop().await;

        // with no outside holders the channel closes here and the forwarder drains
        if Arc::strong_count(&instance) == 1 {
            drop(instance);
            if let Err(e) = forwarder.await {
                tracing::warn!(agent_id, "Event forwarder ended abnormally: {e}");
            }
        }

        tracing::info!(agent_id, "Agent shut down");
        self.events.emit(LifecycleEvent::AgentShutdown {
            agent_id: agent_id.to_string(),
        });
        true
    }

    /// Stop every instance. Returns how many were running.
    pub async fn shutdown_all(&self) -> usize {
        let ids: Vec<String> = self.instances.read().await.keys().cloned().collect();
        let mut stopped = 0;
        for id in ids {
            if self.shutdown_instance(&id).await {
                stopped += 1;
            }
        }
        stopped
    }

    /// Re-read an agent's descriptor from disk and recreate its instance.
    ///
    /// # Errors
    /// Returns `NotFound` for unknown ids, `Validation` when the agent has no
    /// descriptor file or the file now declares another id, and any load or
    /// instantiation error.
    pub async fn reload(&self, agent_id: &str) -> Result<Arc<AgentInstance>, RegistryError> {
        let source: PathBuf = self
            .definitions
            .read()
            .await
            .by_id
            .get(agent_id)
            .ok_or_else(|| RegistryError::NotFound(agent_id.to_string()))?
            .source
            .clone()
            .ok_or_else(|| RegistryError::validation(agent_id, "no descriptor file to reload from"))?;

        let definition = loader::load_definition_file(&source).await?;
        if definition.id != agent_id {
            return Err(RegistryError::validation(
                source.display().to_string(),
                format!("descriptor now declares id `{}`", definition.id),
            ));
        }
        self.definitions.write().await.insert(definition);

        let instance = self.create_instance(agent_id, None).await?;
        tracing::info!(agent_id, source = %source.display(), "Agent reloaded");
        Ok(instance)
    }
}

#[cfg(test)]
mod tests {
    use paired_core::InMemoryKnowledge;
    use tempfile::TempDir;

    use super::*;

    fn descriptor(id: &str, pattern: &str) -> String {
        format!(
            "id = \"{id}\"\nname = \"{id}\"\nrole = \"role\"\nversion = \"1.0.0\"\n\n[[routing]]\npattern = \"{pattern}\"\n"
        )
    }

    fn factory() -> (AgentFactory, Arc<EventBus>) {
        let events = Arc::new(EventBus::new());
        (
            AgentFactory::new(BehaviorTable::new(), RuntimeConfig::default(), Arc::clone(&events)),
            events,
        )
    }

    fn roster_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("10-planner.toml"), descriptor("planner", "plan")).unwrap();
        std::fs::write(dir.path().join("20-qa.toml"), descriptor("qa", "test")).unwrap();
        std::fs::write(
            dir.path().join("30-broken.toml"),
            descriptor("broken", "(unclosed"),
        )
        .unwrap();
        std::fs::write(
            dir.path().join("40-dormant.toml"),
            "id = \"dormant\"\nname = \"d\"\nrole = \"r\"\nversion = \"1.0.0\"\nstatus = \"inactive\"\n",
        )
        .unwrap();
        dir
    }

    #[tokio::test]
    async fn test_initialize_all_isolates_bad_agent() {
        let dir = roster_dir();
        let (factory, _events) = factory();
        assert_eq!(factory.load_definitions(dir.path()).await.unwrap(), 4);

        let outcomes = factory.initialize_all().await;
        let status = |id: &str| outcomes.iter().find(|o| o.agent_id == id).map(|o| o.status.clone());

        assert_eq!(status("planner"), Some(InitStatus::Success));
        assert_eq!(status("qa"), Some(InitStatus::Success));
        assert!(matches!(status("broken"), Some(InitStatus::Failed { .. })));
        assert!(matches!(status("dormant"), Some(InitStatus::Skipped { .. })));
        assert_eq!(factory.list_instances().await.len(), 2);
    }

    #[tokio::test]
    async fn test_malformed_descriptor_keeps_previous_roster() {
        let dir = roster_dir();
        let (factory, _events) = factory();
        factory.load_definitions(dir.path()).await.unwrap();

        std::fs::write(dir.path().join("50-bad.toml"), "id = \"Nope\"").unwrap();
        assert!(factory.load_definitions(dir.path()).await.is_err());
        assert_eq!(factory.definitions().await.len(), 4);
    }

    #[tokio::test]
    async fn test_route_picks_running_agent() {
        let dir = roster_dir();
        let (factory, _events) = factory();
        factory.load_definitions(dir.path()).await.unwrap();
        factory.initialize_all().await;

        let ctx = TaskContext::default();
        assert_eq!(factory.route("write a test", &ctx).await.unwrap().agent_id, "qa");
        assert!(factory.route("nothing relevant", &ctx).await.is_none());

        factory.shutdown_instance("qa").await;
        assert!(factory.route("write a test", &ctx).await.is_none());
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent_and_events_forwarded() {
        let (factory, events) = factory();
        factory
            .register_definition(AgentDefinition::from_toml(&descriptor("planner", "plan"), None).unwrap())
            .await
            .unwrap();
        let instance = factory.create_instance("planner", None).await.unwrap();

        let knowledge = InMemoryKnowledge::new();
        let report = instance.execute("plan the sprint", TaskContext::default(), &knowledge).await;
        assert!(report.is_success());
        drop(instance);

        assert!(factory.shutdown_instance("planner").await);
        assert!(!factory.shutdown_instance("planner").await);

        let names: Vec<&str> = events.history().iter().map(LifecycleEvent::name).collect();
        assert_eq!(names, vec!["agentInitialized", "taskCompleted", "agentShutdown"]);
    }

    #[tokio::test]
    async fn test_create_unknown_and_override() {
        let (factory, _events) = factory();
        assert!(matches!(
            factory.create_instance("ghost", None).await,
            Err(RegistryError::NotFound(_))
        ));

        factory
            .register_definition(AgentDefinition::from_toml(&descriptor("planner", "plan"), None).unwrap())
            .await
            .unwrap();
        let overrides = DefinitionOverride {
            priority: Some(9),
            ..DefinitionOverride::default()
        };
        let instance = factory.create_instance("planner", Some(&overrides)).await.unwrap();
        assert_eq!(instance.definition().priority, 9);

        let bad = DefinitionOverride {
            priority: Some(11),
            ..DefinitionOverride::default()
        };
        assert!(factory.create_instance("planner", Some(&bad)).await.is_err());
    }

    #[tokio::test]
    async fn test_reload_picks_up_descriptor_changes() {
        let dir = roster_dir();
        let (factory, _events) = factory();
        factory.load_definitions(dir.path()).await.unwrap();
        factory.initialize_all().await;
        assert!(factory.route("deploy", &TaskContext::default()).await.is_none());

        std::fs::write(dir.path().join("20-qa.toml"), descriptor("qa", "deploy")).unwrap();
        let instance = factory.reload("qa").await.unwrap();
        assert_eq!(instance.definition().routing_rules[0].pattern, "deploy");
        assert_eq!(
            factory.route("deploy", &TaskContext::default()).await.unwrap().agent_id,
            "qa"
        );
        assert!(matches!(factory.reload("ghost").await, Err(RegistryError::NotFound(_))));
    }
}
