use super::encoder::{
    encode_features, record_from_metadata, ContentFeatures, ContentRegistry, DEFAULT_AUTHENTICITY,
};
use super::feedback::normalize_feedback;
use super::governor::TableGovernor;
use super::learner::{clamp_reward, QLearner, ReplayBuffer};
use super::policy::{DecisionPolicy, QTable};
use super::rules::{apply_mcp_weighting, RuleSet};
use super::state_store::StateStore;
use crate::config::Config;
use crate::error::Result;
use crate::models::{
    Action, AgentState, AgentStatistics, Content, ContentType, Experience, FeedbackType,
    HistoryEntry, Metadata, ModerationOutcome, PolicyEntry, PretrainExample, StateKey,
};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Everything the agent mutates. Guarded by a single lock so that
/// `moderate` and feedback updates never interleave inside the table.
struct LearningState {
    registry: ContentRegistry,
    table: QTable,
    policy: DecisionPolicy,
    rng: StdRng,
    history: VecDeque<HistoryEntry>,
    replay: ReplayBuffer,
    recent_rewards: VecDeque<f64>,
    total_moderations: u64,
    /// Bumped for every snapshot handed to the persister.
    generation: u64,
}

impl LearningState {
    fn persistable_snapshot(&mut self) -> (u64, AgentState) {
        self.generation += 1;
        (self.generation, self.snapshot())
    }

    fn snapshot(&self) -> AgentState {
        AgentState {
            q_table: self.table.snapshot(),
            epsilon: self.policy.epsilon,
            recent_rewards: self.recent_rewards.iter().copied().collect(),
            timestamp: Utc::now(),
        }
    }
}

/// Orders writes to the store so that a snapshot never replaces a newer one.
///
/// Background saves run as detached tasks and may reach the store out of
/// order; anything older than the last written generation is dropped.
struct Persister {
    store: Arc<dyn StateStore>,
    last_written: Mutex<u64>,
}

impl Persister {
    fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            store,
            last_written: Mutex::new(0),
        }
    }

    /// Returns false when the snapshot was superseded and skipped.
    async fn persist(&self, generation: u64, snapshot: &AgentState) -> Result<bool> {
        let mut last_written = self.last_written.lock().await;
        if generation <= *last_written {
            tracing::debug!(
                generation,
                last_written = *last_written,
                "Skipping superseded state snapshot"
            );
            return Ok(false);
        }
        self.store.save(snapshot).await?;
        *last_written = generation;
        Ok(true)
    }
}

/// Stateful moderation agent: rule scoring plus a tabular policy that
/// learns from delayed feedback.
pub struct ModerationAgent {
    config: Config,
    rules: RuleSet,
    persister: Arc<Persister>,
    learner: QLearner,
    governor: TableGovernor,
    state: Mutex<LearningState>,
}

impl ModerationAgent {
    /// Fresh agent with an empty table. Nothing is read from `store`.
    pub fn new(config: Config, rules: RuleSet, store: Arc<dyn StateStore>) -> Result<Self> {
        config.validate()?;

        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let state = LearningState {
            registry: ContentRegistry::new(config.max_registered_contents),
            table: QTable::new(),
            policy: DecisionPolicy::new(config.epsilon),
            rng,
            history: VecDeque::with_capacity(config.max_history.min(1024)),
            replay: ReplayBuffer::new(config.max_replay),
            recent_rewards: VecDeque::with_capacity(config.recent_rewards_kept),
            total_moderations: 0,
            generation: 0,
        };

        Ok(Self {
            learner: QLearner::new(config.learning_rate, config.discount_factor),
            governor: TableGovernor::new(config.max_q_table_size),
            rules,
            persister: Arc::new(Persister::new(store)),
            config,
            state: Mutex::new(state),
        })
    }

    /// Build the agent and restore persisted state. Unreadable state is
    /// logged and the agent starts empty.
    pub async fn bootstrap(
        config: Config,
        rules: RuleSet,
        store: Arc<dyn StateStore>,
    ) -> Result<Self> {
        let agent = Self::new(config, rules, store)?;
        agent.load_state().await;
        Ok(agent)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns true when a persisted state was applied.
    pub async fn load_state(&self) -> bool {
        let persisted = match self.persister.store.load().await {
            Ok(Some(persisted)) => persisted,
            Ok(None) => {
                tracing::info!("No persisted agent state, starting with an empty table");
                return false;
            }
            Err(err) => {
                tracing::warn!(error = %err, "Failed to load agent state, starting with an empty table");
                return false;
            }
        };

        let mut state = self.state.lock().await;
        state.table = QTable::from_snapshot(persisted.q_table);
        if persisted.epsilon.is_finite() {
            state.policy = DecisionPolicy::new(persisted.epsilon);
        }

        let kept = self.config.recent_rewards_kept;
        let skip = persisted.recent_rewards.len().saturating_sub(kept);
        state.recent_rewards = persisted
            .recent_rewards
            .into_iter()
            .skip(skip)
            .map(clamp_reward)
            .collect();

        self.governor.enforce(&mut state.table, None);
        tracing::info!(
            q_table_size = state.table.len(),
            epsilon = state.policy.epsilon,
            "Agent state loaded"
        );
        true
    }

    /// Store a content record and materialize its table entry.
    ///
    /// Missing `length` and `toxicity_score` metadata default to 0.
    pub async fn register_content(
        &self,
        content_id: &str,
        content_type: ContentType,
        metadata: &Metadata,
    ) -> StateKey {
        let record = record_from_metadata(content_id, content_type, metadata, 0, 0.0);
        let mut state = self.state.lock().await;
        let key = state.registry.register(record);
        state.table.ensure(&key);
        self.governor.enforce(&mut state.table, Some(&key));
        key
    }

    /// State key of a registered id, or the sentinel key for unknown ids.
    pub async fn encode(&self, content_id: &str) -> StateKey {
        self.state.lock().await.registry.encode(content_id)
    }

    /// Score `content`, pick a policy action and record the decision.
    ///
    /// The content id is taken from `metadata.content_id` when present,
    /// otherwise a new one is generated. Rule engine errors are returned as is.
    pub async fn moderate(
        &self,
        content: &Content,
        content_type: ContentType,
        metadata: Metadata,
    ) -> Result<ModerationOutcome> {
        let content_id = metadata
            .get_str("content_id")
            .filter(|id| !id.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let rule = self.rules.evaluate(content_type, content, &metadata).await?;
        let mcp_weighted_score = metadata
            .nested("mcp")
            .map(|_| apply_mcp_weighting(rule.score, &metadata));
        let score = mcp_weighted_score.unwrap_or(rule.score);

        let record = record_from_metadata(&content_id, content_type, &metadata, content.len(), score);

        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let key = state.registry.register(record);
        state.table.ensure(&key);
        self.governor.enforce(&mut state.table, Some(&key));

        let action = state
            .policy
            .select_action(&mut state.rng, &state.table, &key, score);

        if state.history.len() >= self.config.max_history {
            state.history.pop_front();
        }
        state.history.push_back(HistoryEntry {
            content_id: content_id.clone(),
            state_key: key.clone(),
            action,
            score,
            confidence: rule.confidence,
            reasons: rule.reasons.clone(),
            timestamp: Utc::now(),
        });
        state.total_moderations += 1;
        drop(guard);

        let flagged = score > self.config.flag_threshold
            || (self.config.action_gates_flag && action == Action::Flag);

        tracing::info!(
            content_id = %content_id,
            content_type = %content_type,
            state_key = %key,
            action = %action,
            score,
            flagged,
            "Content moderated"
        );

        Ok(ModerationOutcome {
            content_id,
            flagged,
            score,
            confidence: rule.confidence,
            reasons: rule.reasons,
            action,
            mcp_weighted_score,
            state_key: key.to_string(),
        })
    }

    /// Apply a reward to the decision recorded for `moderation_id`.
    ///
    /// Only the most recent `feedback_window` decisions are searched. The
    /// reward is always counted in the reward statistics; returns whether a
    /// matching decision was found and updated.
    pub async fn update_with_feedback(&self, moderation_id: &str, reward: f64) -> bool {
        let reward = clamp_reward(reward);

        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        if state.recent_rewards.len() >= self.config.recent_rewards_kept {
            state.recent_rewards.pop_front();
        }
        state.recent_rewards.push_back(reward);

        let matched = state
            .history
            .iter()
            .rev()
            .take(self.config.feedback_window)
            .find(|entry| entry.content_id == moderation_id)
            .map(|entry| (entry.state_key.clone(), entry.action));

        let Some((key, action)) = matched else {
            tracing::info!(
                moderation_id = %moderation_id,
                reward,
                "No recent moderation matches feedback, table unchanged"
            );
            return false;
        };

        let new_value = self
            .learner
            .td_update(&mut state.table, &key, action, reward, &key);
        state.replay.push(Experience {
            state_key: key.clone(),
            action,
            reward,
            next_state_key: key.clone(),
        });

        let run_replay = state.rng.gen::<f64>() < self.config.replay_probability;
        let run_save = state.rng.gen::<f64>() < self.config.save_probability;

        if run_replay {
            let applied = self.replay_locked(state, 1, self.config.replay_batch_size);
            tracing::debug!(applied, "Replay batch applied");
        }
        self.governor.enforce(&mut state.table, Some(&key));

        let snapshot = run_save.then(|| state.persistable_snapshot());
        drop(guard);

        tracing::info!(
            moderation_id = %moderation_id,
            state_key = %key,
            action = %action,
            reward,
            new_value,
            "Feedback applied"
        );

        if let Some((generation, snapshot)) = snapshot {
            self.spawn_save(generation, snapshot);
        }
        true
    }

    /// Parse and normalize user feedback, then apply it. Returns the reward.
    pub async fn submit_feedback(
        &self,
        moderation_id: &str,
        feedback_type: &str,
        rating: Option<u8>,
    ) -> Result<f64> {
        let feedback: FeedbackType = feedback_type.parse()?;
        let reward = normalize_feedback(feedback, rating);
        self.update_with_feedback(moderation_id, reward).await;
        Ok(reward)
    }

    /// Run `batches` replay batches of up to `batch_size` samples each.
    /// Returns the number of TD updates applied.
    pub async fn batch_update_from_replay(&self, batches: usize, batch_size: usize) -> usize {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let applied = self.replay_locked(state, batches, batch_size);
        self.governor.enforce(&mut state.table, None);
        applied
    }

    fn replay_locked(&self, state: &mut LearningState, batches: usize, batch_size: usize) -> usize {
        let mut applied = 0;
        for _ in 0..batches {
            let batch = state.replay.sample(&mut state.rng, batch_size);
            if batch.is_empty() {
                break;
            }
            for experience in &batch {
                self.learner.apply(&mut state.table, experience);
                applied += 1;
            }
        }
        applied
    }

    /// Seed the table from labelled examples, then save explicitly.
    /// Returns the number of examples applied.
    pub async fn pretrain_from_examples(&self, examples: &[PretrainExample]) -> usize {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let mut applied = 0;
        for example in examples {
            if !example.score.is_finite() {
                tracing::warn!(content_type = %example.content_type, "Skipping example with non-finite score");
                continue;
            }

            let key = encode_features(&ContentFeatures {
                content_type: example.content_type,
                length: example.length.unwrap_or(0),
                toxicity_score: example.toxicity_score.unwrap_or(example.score),
                authenticity_score: example.authenticity_score.unwrap_or(DEFAULT_AUTHENTICITY),
            });
            let action = example
                .action
                .unwrap_or_else(|| Action::from_score(example.score));
            let reward = clamp_reward(example.reward);

            self.learner
                .td_update(&mut state.table, &key, action, reward, &key);
            state.replay.push(Experience {
                state_key: key.clone(),
                action,
                reward,
                next_state_key: key,
            });
            applied += 1;
        }

        self.governor.enforce(&mut state.table, None);
        let (generation, snapshot) = state.persistable_snapshot();
        drop(guard);

        tracing::info!(applied, total = examples.len(), "Pretraining complete");
        if let Err(err) = self.persister.persist(generation, &snapshot).await {
            tracing::warn!(error = %err, "Failed to save state after pretraining");
        }
        applied
    }

    pub async fn get_statistics(&self) -> AgentStatistics {
        let state = self.state.lock().await;
        let avg_recent_reward = if state.recent_rewards.is_empty() {
            0.0
        } else {
            state.recent_rewards.iter().sum::<f64>() / state.recent_rewards.len() as f64
        };

        AgentStatistics {
            total_moderations: state.total_moderations,
            history_size: state.history.len(),
            q_table_size: state.table.len(),
            epsilon: state.policy.epsilon,
            learning_rate: self.learner.learning_rate,
            discount_factor: self.learner.discount_factor,
            replay_buffer_size: state.replay.len(),
            registered_contents: state.registry.len(),
            avg_recent_reward,
        }
    }

    pub async fn q_values(&self, key: &StateKey) -> Option<PolicyEntry> {
        self.state.lock().await.table.get(key).copied()
    }

    pub async fn snapshot(&self) -> AgentState {
        self.state.lock().await.snapshot()
    }

    /// Enforce the table budget and persist the current state.
    ///
    /// Background saves still in flight are older than this snapshot and
    /// will not overwrite it.
    pub async fn save_state(&self) -> Result<()> {
        let (generation, snapshot) = {
            let mut state = self.state.lock().await;
            self.governor.enforce(&mut state.table, None);
            state.persistable_snapshot()
        };
        self.persister.persist(generation, &snapshot).await?;
        Ok(())
    }

    fn spawn_save(&self, generation: u64, snapshot: AgentState) {
        let persister = Arc::clone(&self.persister);
        tokio::spawn(async move {
            if let Err(err) = persister.persist(generation, &snapshot).await {
                tracing::warn!(error = %err, "Background state save failed");
            }
        });
    }
}
