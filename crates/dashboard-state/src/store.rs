//! Application state store.
//!
//! Owns the [`GatewayClient`], applies its connection events to a shared
//! [`DashboardState`] on a pump task, and exposes load/mutate operations
//! that replace domain snapshots on success. Readers take clones via
//! [`snapshot`](GatewayStore::snapshot) and learn about changes from
//! [`subscribe`](GatewayStore::subscribe).

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::sync::{Mutex, RwLock, broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

use clawdeck_gateway::{ConnectionEvent, ConnectionStatus, GatewayClient, GatewayError, ReconnectConfig};
use clawdeck_protocol::{EventFrame, GatewayEvent, Method};
use clawdeck_protocol::constants::{CHAT_HISTORY_LIMIT, CRON_RUNS_LIMIT};
use clawdeck_protocol::messages::{
    ChatHistoryParams, ChatHistoryResponse, ChatSendParams, ConfigApplyParams, CronListResponse,
    CronRunParams, CronRunsParams, CronRunsResponse, IdParams, OutboundAttachment, PatchParams,
    SkillInstallParams, SkillPatch, SkillUpdateParams,
};
use clawdeck_protocol::types::{
    AgentsListResult, ChannelsStatusSnapshot, ChatAttachment, ConfigSnapshot, CronStatus,
    SessionsListResult, SkillStatusReport,
};

use crate::chat::now_ms;
use crate::settings::{Settings, SettingsPatch};
use crate::state::DashboardState;

/// `cron.run` mode that ignores the schedule.
const FORCE_RUN_MODE: &str = "force";

/// Unhandled push events a slow subscriber may fall behind by.
const OTHER_EVENTS_BUFFER: usize = 256;

struct Shared {
    state: RwLock<DashboardState>,
    changes: watch::Sender<u64>,
    other_events: broadcast::Sender<EventFrame>,
}

impl Shared {
    /// Mutates the state under the write lock and notifies subscribers.
    async fn update<R>(&self, f: impl FnOnce(&mut DashboardState) -> R) -> R {
        let result = {
            let mut state = self.state.write().await;
            f(&mut state)
        };
        self.changes.send_modify(|version| *version = version.wrapping_add(1));
        result
    }
}

/// Store driving one gateway connection at a time.
pub struct GatewayStore {
    shared: Arc<Shared>,
    client: Mutex<Option<Arc<GatewayClient>>>,
    pump: Mutex<Option<JoinHandle<()>>>,
    reconnect: Option<ReconnectConfig>,
    connect_debounce: Option<Duration>,
}

impl GatewayStore {
    pub fn new(settings: Settings) -> Self {
        let (changes, _) = watch::channel(0);
        let (other_events, _) = broadcast::channel(OTHER_EVENTS_BUFFER);
        Self {
            shared: Arc::new(Shared {
                state: RwLock::new(DashboardState::new(settings)),
                changes,
                other_events,
            }),
            client: Mutex::new(None),
            pump: Mutex::new(None),
            reconnect: None,
            connect_debounce: None,
        }
    }

    /// Overrides the reconnect backoff of clients created by [`connect`](Self::connect).
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = Some(reconnect);
        self
    }

    /// Overrides the challenge debounce of clients created by [`connect`](Self::connect).
    pub fn with_connect_debounce(mut self, debounce: Duration) -> Self {
        self.connect_debounce = Some(debounce);
        self
    }

    /// Clone of the current state.
    pub async fn snapshot(&self) -> DashboardState {
        self.shared.state.read().await.clone()
    }

    /// Reads the state through `f` without cloning all of it.
    pub async fn read<R>(&self, f: impl FnOnce(&DashboardState) -> R) -> R {
        f(&*self.shared.state.read().await)
    }

    /// Receiver whose version bumps after every state change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.shared.changes.subscribe()
    }

    /// Push events with no reducer, in arrival order, after they are
    /// applied to the state. A receiver that lags more than
    /// `OTHER_EVENTS_BUFFER` frames behind gets `RecvError::Lagged`.
    pub fn subscribe_events(&self) -> broadcast::Receiver<EventFrame> {
        self.shared.other_events.subscribe()
    }

    pub async fn status(&self) -> ConnectionStatus {
        self.read(|s| s.status).await
    }

    pub async fn settings(&self) -> Settings {
        self.read(|s| s.settings.clone()).await
    }

    /// Merges `patch` into the settings. Takes effect on the next connect.
    pub async fn set_settings(&self, patch: SettingsPatch) {
        self.shared.update(|s| s.settings.merge(patch)).await;
    }

    // ---- connection ----

    /// Replaces any existing client with a fresh one built from the settings
    /// and starts it.
    pub async fn connect(&self) {
        self.teardown().await;

        let mut options = self.read(|s| s.settings.client_options()).await;
        if let Some(reconnect) = &self.reconnect {
            options = options.with_reconnect(reconnect.clone());
        }
        if let Some(debounce) = self.connect_debounce {
            options = options.with_connect_debounce(debounce);
        }
        info!(url = %options.url, "connecting to gateway");

        self.shared
            .update(|s| {
                s.status = ConnectionStatus::Connecting;
                s.error = None;
            })
            .await;

        let client = Arc::new(GatewayClient::new(options));
        if let Some(events) = client.take_events().await {
            let handle = tokio::spawn(event_pump(self.shared.clone(), events));
            *self.pump.lock().await = Some(handle);
        }
        client.start().await;
        *self.client.lock().await = Some(client);
    }

    /// Stops the client and forgets the hello.
    pub async fn disconnect(&self) {
        self.teardown().await;
        self.shared
            .update(|s| {
                s.status = ConnectionStatus::Disconnected;
                s.hello = None;
            })
            .await;
        info!("disconnected from gateway");
    }

    async fn teardown(&self) {
        let client = self.client.lock().await.take();
        if let Some(client) = client {
            client.stop().await;
        }
        let pump = self.pump.lock().await.take();
        if let Some(handle) = pump {
            handle.abort();
            let _ = handle.await;
        }
    }

    async fn client(&self) -> Option<Arc<GatewayClient>> {
        self.client.lock().await.clone()
    }

    // ---- request helpers ----

    /// Sends one request and decodes the payload. `Ok(None)` when there is
    /// no client; failures are recorded before being returned.
    async fn fetch<T, P>(&self, method: Method, params: &P) -> Result<Option<T>, GatewayError>
    where
        T: DeserializeOwned,
        P: Serialize + ?Sized,
    {
        let Some(client) = self.client().await else {
            debug!(%method, "no gateway client, skipping request");
            return Ok(None);
        };
        match client.request_as::<T, P>(method, params).await {
            Ok(payload) => Ok(Some(payload)),
            Err(e) => {
                let message = e.to_string();
                self.shared
                    .update(|s| s.record_request_failure(method.as_str(), &message))
                    .await;
                Err(e)
            }
        }
    }

    /// Sends a mutation. Returns `false` when there is no client.
    async fn mutate<P>(&self, method: Method, params: &P) -> Result<bool, GatewayError>
    where
        P: Serialize + ?Sized,
    {
        Ok(self.fetch::<Value, P>(method, params).await?.is_some())
    }

    // ---- cron ----

    pub async fn load_cron_status(&self) -> Result<(), GatewayError> {
        if let Some(status) = self.fetch::<CronStatus, _>(Method::CronStatus, &json!({})).await? {
            self.shared.update(|s| s.cron_status = Some(status)).await;
        }
        Ok(())
    }

    pub async fn load_cron_jobs(&self) -> Result<(), GatewayError> {
        if let Some(res) = self
            .fetch::<CronListResponse, _>(Method::CronList, &json!({}))
            .await?
        {
            self.shared
                .update(|s| s.cron_jobs = res.jobs.unwrap_or_default())
                .await;
        }
        Ok(())
    }

    pub async fn load_cron_runs(&self, job_id: &str) -> Result<(), GatewayError> {
        let params = CronRunsParams {
            id: job_id.to_string(),
            limit: CRON_RUNS_LIMIT,
        };
        if let Some(res) = self
            .fetch::<CronRunsResponse, _>(Method::CronRuns, &params)
            .await?
        {
            self.shared
                .update(|s| {
                    s.cron_runs = res.entries.unwrap_or_default();
                    s.cron_runs_job_id = Some(job_id.to_string());
                })
                .await;
        }
        Ok(())
    }

    /// Creates a job from a partial job object and refreshes the list.
    pub async fn add_cron_job(&self, job: &Value) -> Result<(), GatewayError> {
        if self.mutate(Method::CronAdd, job).await? {
            self.load_cron_jobs().await?;
        }
        Ok(())
    }

    pub async fn update_cron_job(&self, id: &str, patch: Value) -> Result<(), GatewayError> {
        let params = PatchParams {
            id: id.to_string(),
            patch,
        };
        if self.mutate(Method::CronUpdate, &params).await? {
            self.load_cron_jobs().await?;
        }
        Ok(())
    }

    pub async fn toggle_cron_job(&self, id: &str, enabled: bool) -> Result<(), GatewayError> {
        self.update_cron_job(id, json!({ "enabled": enabled })).await
    }

    pub async fn remove_cron_job(&self, id: &str) -> Result<(), GatewayError> {
        let params = IdParams { id: id.to_string() };
        if self.mutate(Method::CronRemove, &params).await? {
            self.load_cron_jobs().await?;
        }
        Ok(())
    }

    /// Runs a job now regardless of its schedule.
    pub async fn run_cron_job(&self, id: &str) -> Result<(), GatewayError> {
        let params = CronRunParams {
            id: id.to_string(),
            mode: FORCE_RUN_MODE.to_string(),
        };
        self.mutate(Method::CronRun, &params).await.map(|_| ())
    }

    // ---- config ----

    pub async fn load_config(&self) -> Result<(), GatewayError> {
        if self.client().await.is_none() {
            debug!("no gateway client, skipping config load");
            return Ok(());
        }
        self.shared.update(|s| s.config_loading = true).await;
        let result = self
            .fetch::<ConfigSnapshot, _>(Method::ConfigGet, &json!({}))
            .await;
        self.shared
            .update(|s| {
                if let Ok(Some(config)) = &result {
                    s.config = Some(config.clone());
                }
                s.config_loading = false;
            })
            .await;
        result.map(|_| ())
    }

    pub async fn apply_config(&self, config: Value) -> Result<(), GatewayError> {
        if self
            .mutate(Method::ConfigApply, &ConfigApplyParams { config })
            .await?
        {
            self.load_config().await?;
        }
        Ok(())
    }

    // ---- agents, channels, sessions ----

    pub async fn load_agents(&self) -> Result<(), GatewayError> {
        if let Some(agents) = self
            .fetch::<AgentsListResult, _>(Method::AgentsList, &json!({}))
            .await?
        {
            self.shared.update(|s| s.agents = Some(agents)).await;
        }
        Ok(())
    }

    pub async fn create_agent(&self, agent: &Value) -> Result<(), GatewayError> {
        if self.mutate(Method::AgentsCreate, agent).await? {
            self.load_agents().await?;
        }
        Ok(())
    }

    pub async fn update_agent(&self, id: &str, patch: Value) -> Result<(), GatewayError> {
        let params = PatchParams {
            id: id.to_string(),
            patch,
        };
        if self.mutate(Method::AgentsUpdate, &params).await? {
            self.load_agents().await?;
        }
        Ok(())
    }

    pub async fn load_channels(&self) -> Result<(), GatewayError> {
        if let Some(channels) = self
            .fetch::<ChannelsStatusSnapshot, _>(Method::ChannelsStatus, &json!({}))
            .await?
        {
            self.shared.update(|s| s.channels = Some(channels)).await;
        }
        Ok(())
    }

    pub async fn load_sessions(&self) -> Result<(), GatewayError> {
        if let Some(sessions) = self
            .fetch::<SessionsListResult, _>(Method::SessionsList, &json!({}))
            .await?
        {
            self.shared.update(|s| s.sessions = Some(sessions)).await;
        }
        Ok(())
    }

    // ---- skills ----

    pub async fn load_skills(&self) -> Result<(), GatewayError> {
        if let Some(skills) = self
            .fetch::<SkillStatusReport, _>(Method::SkillsStatus, &json!({}))
            .await?
        {
            self.shared.update(|s| s.skills = Some(skills)).await;
        }
        Ok(())
    }

    pub async fn install_skill(&self, name: &str, install_id: &str) -> Result<(), GatewayError> {
        let params = SkillInstallParams {
            name: name.to_string(),
            install_id: install_id.to_string(),
        };
        if self.mutate(Method::SkillsInstall, &params).await? {
            self.load_skills().await?;
        }
        Ok(())
    }

    pub async fn update_skill(&self, skill_key: &str, patch: SkillPatch) -> Result<(), GatewayError> {
        let params = SkillUpdateParams {
            skill_key: skill_key.to_string(),
            patch,
        };
        if self.mutate(Method::SkillsUpdate, &params).await? {
            self.load_skills().await?;
        }
        Ok(())
    }

    // ---- chat ----

    /// Switches the chat to `key` and loads its history.
    ///
    /// The transcript is cleared right away. A response that arrives after
    /// another session was selected is discarded.
    pub async fn set_chat_session(&self, key: &str) -> Result<(), GatewayError> {
        let connected = self
            .shared
            .update(|s| {
                s.chat.select_session(key);
                s.is_connected()
            })
            .await;
        let client = match self.client().await {
            Some(client) if connected => client,
            _ => {
                debug!(session = key, "not connected, history not loaded");
                self.shared.update(|s| s.chat.loading = false).await;
                return Ok(());
            }
        };

        let params = ChatHistoryParams {
            session_key: key.to_string(),
            limit: CHAT_HISTORY_LIMIT,
        };
        let result = client
            .request_as::<ChatHistoryResponse, _>(Method::ChatHistory, &params)
            .await;

        self.shared
            .update(|s| {
                if s.chat.session_key.as_deref() != Some(key) {
                    return;
                }
                match &result {
                    Ok(res) => s.chat.load_history(res.messages.as_deref().unwrap_or_default()),
                    Err(e) => {
                        s.chat.messages.clear();
                        s.chat.loading = false;
                        s.record_request_failure(Method::ChatHistory.as_str(), &e.to_string());
                    }
                }
            })
            .await;
        result.map(|_| ())
    }

    /// Sends a user message to the selected session.
    ///
    /// The message shows up locally before the request goes out. Without
    /// `attachments` the queued ones are sent. A no-op unless connected.
    pub async fn send_chat_message(
        &self,
        text: &str,
        attachments: Option<Vec<ChatAttachment>>,
    ) -> Result<(), GatewayError> {
        let client = self.client().await;
        let Some(client) = client else {
            debug!("no gateway client, message not sent");
            return Ok(());
        };

        let prepared = self
            .shared
            .update(|s| {
                if !s.is_connected() {
                    return None;
                }
                let outgoing = s.chat.begin_send(text, attachments);
                Some((s.session_key().to_string(), outgoing))
            })
            .await;
        let Some((session_key, outgoing)) = prepared else {
            debug!("not connected, message not sent");
            return Ok(());
        };

        let params = ChatSendParams {
            session_key,
            message: text.to_string(),
            deliver: false,
            idempotency_key: idempotency_key(),
            attachments: outgoing.iter().map(outbound_attachment).collect(),
        };

        if let Err(e) = client.request(Method::ChatSend, &params).await {
            let message = e.to_string();
            self.shared
                .update(|s| {
                    s.chat.loading = false;
                    s.record_request_failure(Method::ChatSend.as_str(), &message);
                })
                .await;
            return Err(e);
        }
        Ok(())
    }

    pub async fn clear_chat(&self) {
        self.shared.update(|s| s.chat.clear()).await;
    }

    pub async fn add_chat_attachment(&self, attachment: ChatAttachment) {
        self.shared.update(|s| s.chat.add_attachment(attachment)).await;
    }

    pub async fn remove_chat_attachment(&self, id: &str) {
        self.shared.update(|s| s.chat.remove_attachment(id)).await;
    }

    pub async fn clear_chat_attachments(&self) {
        self.shared.update(|s| s.chat.clear_attachments()).await;
    }
}

impl Drop for GatewayStore {
    fn drop(&mut self) {
        if let Ok(mut pump) = self.pump.try_lock()
            && let Some(handle) = pump.take()
        {
            handle.abort();
        }
    }
}

/// Applies connection events in arrival order until the client goes away.
async fn event_pump(shared: Arc<Shared>, mut events: mpsc::Receiver<ConnectionEvent>) {
    while let Some(event) = events.recv().await {
        shared.update(|s| s.apply(&event)).await;
        if let ConnectionEvent::Event(GatewayEvent::Other(frame)) = event
            && shared.other_events.send(frame).is_err()
        {
            trace!("no event subscribers");
        }
    }
    debug!("event pump finished");
}

fn outbound_attachment(attachment: &ChatAttachment) -> OutboundAttachment {
    OutboundAttachment {
        name: attachment
            .name
            .clone()
            .unwrap_or_else(|| attachment.id.clone()),
        mime_type: attachment.mime_type.clone(),
        buffer: attachment.base64_body().to_string(),
    }
}

/// `<unix-ms>-<random base36>`, unique per send.
fn idempotency_key() -> String {
    let random = uuid::Uuid::new_v4().as_u64_pair().0;
    format!("{}-{}", now_ms(), to_base36(random))
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}
