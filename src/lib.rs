//! deepbot: a chat front-end for openrouter-compatible llm gateways, as a bevy plugin.
//!
//! - each chat view is an entity with a [`ChatSession`] that owns its own
//!   conversation log; nothing is shared between sessions.
//! - one request in flight per session. a submission while awaiting is
//!   rejected at the input boundary (see [`ChatRejected`]), never queued.
//! - the network call never blocks the main thread: on native we spawn onto a
//!   tiny tokio runtime, on wasm we await on bevy's async pool.
//! - failures become assistant messages; nothing here is fatal.
//!
//! the pure pieces (conversation store, dispatcher, transports, graph
//! filter) live in their own modules and work without an `App`.

use bevy::prelude::*;
use bevy::tasks::AsyncComputeTaskPool;
use flume::{Receiver, Sender, TryRecvError};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

pub mod config;
pub mod conversation;
pub mod diagnostics;
pub mod dispatch;
pub mod error;
pub mod graph;
pub mod routes;
pub mod transport;
pub mod view;

pub use config::{ChatSettings, DeepBotConfig};
pub use conversation::{Conversation, Message, Origin};
pub use dispatch::{ChatState, Rejection};
pub use error::{CompletionError, ErrorCategory};
pub use graph::{GraphBrowser, TOPIC_NODES, TopicNode};
pub use routes::{CurrentRoute, Route};
pub use transport::{CompletionRequest, CompletionTransport, HttpTransport, LlmTransport};

/// transport key for the `llm` client binding.
pub const CLIENT_TRANSPORT: &str = "client";
/// transport key for the raw http transport.
pub const FETCH_TRANSPORT: &str = "fetch";

/// ready-to-use transports.
///
/// - `default`: used when a `ChatSession` doesn't specify a `key`
/// - `per_key`: named transports, e.g. one per chat view
#[derive(Resource, Clone)]
pub struct Transports {
    pub default: Arc<dyn CompletionTransport>,
    pub per_key: HashMap<String, Arc<dyn CompletionTransport>>,
}

impl Transports {
    pub fn new(default: Arc<dyn CompletionTransport>) -> Self {
        Self { default, per_key: HashMap::new() }
    }
    pub fn with(mut self, key: impl Into<String>, transport: Arc<dyn CompletionTransport>) -> Self {
        self.per_key.insert(key.into(), transport);
        self
    }
    /// client binding by default, raw http under [`FETCH_TRANSPORT`].
    pub fn from_config(cfg: &DeepBotConfig) -> Self {
        let client: Arc<dyn CompletionTransport> = Arc::new(LlmTransport::from_config(cfg));
        Self::new(client.clone())
            .with(CLIENT_TRANSPORT, client)
            .with(FETCH_TRANSPORT, Arc::new(HttpTransport::from_config(cfg)))
    }
    fn get(&self, key: Option<&String>) -> Arc<dyn CompletionTransport> {
        if let Some(k) = key {
            self.per_key.get(k).cloned().unwrap_or_else(|| self.default.clone())
        } else {
            self.default.clone()
        }
    }
}

/// on native we keep a tiny tokio runtime to drive transport futures
/// (the http transport needs it for `spawn_blocking`).
#[cfg(not(target_arch = "wasm32"))]
#[derive(Resource, Clone)]
pub struct TokioRt(pub Arc<tokio::runtime::Runtime>);

#[cfg(not(target_arch = "wasm32"))]
impl Default for TokioRt {
    fn default() -> Self {
        info!(target: "deepbot", "DeepBot: initializing Tokio multi-thread runtime (native)");
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .expect("tokio runtime");
        Self(Arc::new(rt))
    }
}

/// system ordering so views can run after we emit events
#[derive(SystemSet, Debug, Hash, PartialEq, Eq, Clone)]
pub enum ChatSet {
    /// deepbot emits Chat* events here (in `Update`)
    Drain,
}

/// one chat view's state. attach to an entity.
#[derive(Component, Clone, Debug, Default)]
pub struct ChatSession {
    /// optional key to pick a transport from `Transports::per_key`.
    pub key: Option<String>,
    pub state: ChatState,
}

impl ChatSession {
    pub fn new(key: Option<&str>, greeting: impl Into<String>) -> Self {
        Self { key: key.map(str::to_string), state: ChatState::with_greeting(greeting) }
    }

    pub fn awaiting(&self) -> bool {
        self.state.is_awaiting()
    }
}

/// insert this component to submit text on a session entity.
#[derive(Component, Clone, Debug)]
pub struct ChatRequest {
    pub text: String,
}

/// helper to submit user text on a session entity.
pub fn send_user_text(commands: &mut Commands, target: Entity, text: impl Into<String>) {
    let text = text.into();
    info!(target: "deepbot", "send_user_text (len={})", text.len());
    commands.entity(target).insert(ChatRequest { text });
}

/// events emitted by the plugin during/after a turn.
#[derive(Event, Debug)]
pub struct ChatStarted {
    pub entity: Entity,
}
#[derive(Event, Debug)]
pub struct ChatRejected {
    pub entity: Entity,
    pub reason: Rejection,
}
#[derive(Event, Debug)]
pub struct ChatReplyEvt {
    pub entity: Entity,
    pub sequence_id: u64,
    pub text: String,
    /// set when the reply is a translated failure.
    pub error: Option<ErrorCategory>,
}

/// send to trigger the debug page's connection probe.
#[derive(Event, Debug, Default)]
pub struct RunProbe {
    pub key: Option<String>,
}

/// last probe status for the debug page.
#[derive(Resource, Debug, Default)]
pub struct ProbeStatus {
    pub running: bool,
    pub result: Option<String>,
}

/// cross-thread inbox; tasks send, main thread drains.
#[derive(Resource, Clone)]
struct ReplyInbox {
    tx: Sender<InboxMsg>,
    rx: Receiver<InboxMsg>,
}

impl Default for ReplyInbox {
    fn default() -> Self {
        let (tx, rx) = flume::bounded(256);
        Self { tx, rx }
    }
}

#[derive(Debug)]
enum InboxMsg {
    Reply { entity: Entity, outcome: Result<String, CompletionError> },
    Probe(diagnostics::ProbeOutcome),
}

/// send to inbox (ignore full/disconnected)
fn push_inbox(tx: &Sender<InboxMsg>, msg: InboxMsg) {
    let _ = tx.send(msg);
}

/// bevy plugin: wires systems, events, resources.
/// uses `DeepBotConfig` and `Transports` if already inserted; otherwise
/// builds them from the environment.
pub struct DeepBotPlugin;

impl Plugin for DeepBotPlugin {
    fn build(&self, app: &mut App) {
        info!(target: "deepbot", "DeepBotPlugin: build()");
        if app.world().get_resource::<DeepBotConfig>().is_none() {
            app.insert_resource(DeepBotConfig::from_env());
        }
        if app.world().get_resource::<Transports>().is_none() {
            let transports = Transports::from_config(app.world().resource::<DeepBotConfig>());
            app.insert_resource(transports);
        }

        app.init_resource::<ReplyInbox>()
            .init_resource::<ProbeStatus>()
            .add_event::<ChatStarted>()
            .add_event::<ChatRejected>()
            .add_event::<ChatReplyEvt>()
            .add_event::<RunProbe>()
            .configure_sets(Update, ChatSet::Drain)
            .add_systems(Update, drain_reply_inbox.in_set(ChatSet::Drain))
            .add_systems(Update, (spawn_chat_requests, spawn_probes).before(ChatSet::Drain));

        #[cfg(not(target_arch = "wasm32"))]
        if app.world().get_resource::<TokioRt>().is_none() {
            app.insert_resource(TokioRt::default());
        }
    }
}

/// runs `work` off the main thread and always delivers one inbox message.
/// a task that dies before finishing is reported through `on_abort`.
#[cfg(not(target_arch = "wasm32"))]
fn spawn_off_thread(
    rt: &TokioRt,
    tx: Sender<InboxMsg>,
    work: impl Future<Output = InboxMsg> + Send + 'static,
    on_abort: impl FnOnce(CompletionError) -> InboxMsg + Send + 'static,
) {
    let rt = rt.0.clone();
    // hand off to tokio so bevy pools stay free.
    AsyncComputeTaskPool::get()
        .spawn(async move {
            let msg = match rt.spawn(work).await {
                Ok(msg) => msg,
                Err(e) => {
                    error!(target: "deepbot", "transport task died: {}", e);
                    on_abort(CompletionError::Transport(e.to_string()))
                }
            };
            push_inbox(&tx, msg);
        })
        .detach();
}

// a panic on wasm takes the whole module down, so there is nothing to recover.
#[cfg(target_arch = "wasm32")]
fn spawn_off_thread(
    tx: Sender<InboxMsg>,
    work: impl Future<Output = InboxMsg> + 'static,
    _on_abort: impl FnOnce(CompletionError) -> InboxMsg + 'static,
) {
    AsyncComputeTaskPool::get()
        .spawn(async move { push_inbox(&tx, work.await) })
        .detach();
}

/// validates submissions and spawns one task per accepted turn.
fn spawn_chat_requests(
    mut commands: Commands,
    config: Res<DeepBotConfig>,
    transports: Res<Transports>,
    inbox: Res<ReplyInbox>,
    mut q: Query<(Entity, &mut ChatSession, &ChatRequest)>,
    mut ev_start: EventWriter<ChatStarted>,
    mut ev_reject: EventWriter<ChatRejected>,
    #[cfg(not(target_arch = "wasm32"))] rt: Res<TokioRt>,
) {
    for (e, mut session, req) in q.iter_mut() {
        // one-shot marker removal
        commands.entity(e).remove::<ChatRequest>();

        let request = match dispatch::submit(&mut session.state, &req.text, &config.chat) {
            Ok(r) => r,
            Err(reason) => {
                warn!(target: "deepbot", "submission rejected: entity={:?} reason={:?}", e, reason);
                ev_reject.write(ChatRejected { entity: e, reason });
                continue;
            }
        };

        let transport = transports.get(session.key.as_ref());
        info!(target: "deepbot",
            "spawn_chat_requests: entity={:?} transport={} model={} msgs={}",
            e, transport.name(), request.model, request.messages.len()
        );
        ev_start.write(ChatStarted { entity: e });

        let tx = inbox.tx.clone();
        let work = async move { InboxMsg::Reply { entity: e, outcome: transport.complete(&request).await } };
        let on_abort = move |err: CompletionError| InboxMsg::Reply { entity: e, outcome: Err(err) };
        #[cfg(not(target_arch = "wasm32"))]
        spawn_off_thread(&rt, tx, work, on_abort);
        #[cfg(target_arch = "wasm32")]
        spawn_off_thread(tx, work, on_abort);
    }
}

fn spawn_probes(
    mut ev: EventReader<RunProbe>,
    config: Res<DeepBotConfig>,
    transports: Res<Transports>,
    inbox: Res<ReplyInbox>,
    mut status: ResMut<ProbeStatus>,
    #[cfg(not(target_arch = "wasm32"))] rt: Res<TokioRt>,
) {
    for RunProbe { key } in ev.read() {
        if status.running {
            continue;
        }
        status.running = true;
        status.result = Some("Testing...".to_string());

        let transport = transports.get(key.as_ref());
        info!(target: "deepbot", "probe: transport={}", transport.name());
        let settings = config.chat.clone();
        let tx = inbox.tx.clone();
        let work = async move { InboxMsg::Probe(diagnostics::probe(transport.as_ref(), &settings).await) };
        let on_abort = |err: CompletionError| InboxMsg::Probe(diagnostics::ProbeOutcome::Failure(err));
        #[cfg(not(target_arch = "wasm32"))]
        spawn_off_thread(&rt, tx, work, on_abort);
        #[cfg(target_arch = "wasm32")]
        spawn_off_thread(tx, work, on_abort);
    }
}

/// drains the inbox, folds outcomes into sessions and emits reply events.
fn drain_reply_inbox(
    inbox: Res<ReplyInbox>,
    mut sessions: Query<&mut ChatSession>,
    mut probe: ResMut<ProbeStatus>,
    mut ev_reply: EventWriter<ChatReplyEvt>,
) {
    // cap per frame; the rest waits for the next one
    const MAX_PER_FRAME: usize = 64;
    for _ in 0..MAX_PER_FRAME {
        let msg = match inbox.rx.try_recv() {
            Ok(m) => m,
            Err(TryRecvError::Empty) => break,
            Err(TryRecvError::Disconnected) => break,
        };
        match msg {
            InboxMsg::Reply { entity, outcome } => {
                let Ok(mut session) = sessions.get_mut(entity) else {
                    warn!(target: "deepbot", "reply for missing session {:?} dropped", entity);
                    continue;
                };
                let error = outcome.as_ref().err().map(CompletionError::category);
                let msg = dispatch::resolve(&mut session.state, outcome);
                info!(target: "deepbot",
                    "reply: entity={:?} seq={} len={} error={:?}",
                    entity, msg.sequence_id(), msg.text().len(), error
                );
                ev_reply.write(ChatReplyEvt {
                    entity,
                    sequence_id: msg.sequence_id(),
                    text: msg.text().to_string(),
                    error,
                });
            }
            InboxMsg::Probe(outcome) => {
                probe.running = false;
                probe.result = Some(outcome.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::tests::FakeTransport;
    use async_trait::async_trait;
    use std::time::Duration;

    /// a transport whose call blows up instead of returning.
    struct PanickingTransport;

    #[async_trait]
    impl CompletionTransport for PanickingTransport {
        fn name(&self) -> &'static str {
            "panicking"
        }

        async fn complete(&self, _: &CompletionRequest) -> Result<String, CompletionError> {
            panic!("transport exploded")
        }
    }

    fn pump_until(app: &mut App, done: impl Fn(&App) -> bool) {
        for _ in 0..400 {
            if done(app) {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
            app.update();
        }
    }

    fn test_app(fake: FakeTransport) -> App {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins);
        app.insert_resource(DeepBotConfig::default());
        app.insert_resource(Transports::new(Arc::new(fake)));
        app.add_plugins(DeepBotPlugin);
        app
    }

    fn session(app: &App, e: Entity) -> &ChatSession {
        app.world().entity(e).get::<ChatSession>().expect("session exists")
    }

    #[test]
    fn attach_request_via_send_user_text() {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins);

        let e = app.world_mut().spawn(ChatSession::default()).id();
        {
            let mut commands = app.world_mut().commands();
            super::send_user_text(&mut commands, e, "hello world");
        }
        app.world_mut().flush();

        let req = app.world().entity(e).get::<ChatRequest>().expect("ChatRequest exists");
        assert_eq!(req.text, "hello world");
    }

    #[test]
    fn busy_session_rejects_request() {
        let mut app = test_app(FakeTransport::ok("never"));
        let mut s = ChatSession::default();
        dispatch::submit(&mut s.state, "first", &ChatSettings::default()).expect("accepted");
        let e = app.world_mut().spawn(s).id();

        {
            let mut commands = app.world_mut().commands();
            super::send_user_text(&mut commands, e, "second");
        }
        app.update();

        assert!(app.world().entity(e).get::<ChatRequest>().is_none());
        assert_eq!(session(&app, e).state.conversation.len(), 2);
        let mut ev = app.world_mut().resource_mut::<Events<ChatRejected>>();
        let rejected: Vec<_> = ev.drain().collect();
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].reason, Rejection::Busy);
    }

    #[test]
    fn blank_request_is_rejected_without_touching_log() {
        let mut app = test_app(FakeTransport::ok("never"));
        let e = app.world_mut().spawn(ChatSession::default()).id();
        {
            let mut commands = app.world_mut().commands();
            super::send_user_text(&mut commands, e, "   ");
        }
        app.update();

        assert_eq!(session(&app, e).state.conversation.len(), 1);
        assert!(!session(&app, e).awaiting());
        let mut ev = app.world_mut().resource_mut::<Events<ChatRejected>>();
        assert_eq!(ev.drain().next().map(|r| r.reason), Some(Rejection::Empty));
    }

    #[test]
    fn drain_folds_reply_into_session() {
        let mut app = test_app(FakeTransport::ok("unused"));
        let mut s = ChatSession::default();
        dispatch::submit(&mut s.state, "q", &ChatSettings::default()).expect("accepted");
        let e = app.world_mut().spawn(s).id();

        {
            let tx = app.world().resource::<ReplyInbox>().tx.clone();
            tx.send(InboxMsg::Reply { entity: e, outcome: Err(CompletionError::status(429, "")) })
                .unwrap();
        }
        app.update();

        let s = session(&app, e);
        assert!(!s.awaiting());
        assert_eq!(s.state.conversation.len(), 3);
        let mut ev = app.world_mut().resource_mut::<Events<ChatReplyEvt>>();
        let replies: Vec<_> = ev.drain().collect();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].sequence_id, 3);
        assert_eq!(replies[0].error, Some(ErrorCategory::RateLimited));
        assert!(replies[0].text.contains("Rate limit exceeded"));
    }

    #[test]
    fn full_turn_through_background_task() {
        let mut app = test_app(FakeTransport::ok("Hello, test successful!"));
        let e = app.world_mut().spawn(ChatSession::new(None, "hi")).id();
        {
            let mut commands = app.world_mut().commands();
            super::send_user_text(&mut commands, e, "ping");
        }
        app.update();

        for _ in 0..400 {
            if !session(&app, e).awaiting() {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
            app.update();
        }

        let s = session(&app, e);
        assert!(!s.awaiting(), "reply never arrived");
        let texts: Vec<_> = s.state.conversation.messages().iter().map(Message::text).collect();
        assert_eq!(texts, vec!["hi", "ping", "Hello, test successful!"]);
    }

    #[test]
    fn probe_result_lands_in_status() {
        let mut app = test_app(FakeTransport::ok("Hello, test successful!"));
        app.world_mut().send_event(RunProbe::default());
        app.update();

        for _ in 0..400 {
            if !app.world().resource::<ProbeStatus>().running {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
            app.update();
        }
        let status = app.world().resource::<ProbeStatus>();
        assert!(!status.running);
        assert_eq!(status.result.as_deref(), Some("✅ SUCCESS: Hello, test successful!"));
    }

    #[test]
    fn panicking_transport_still_releases_session() {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins);
        app.insert_resource(DeepBotConfig::default());
        app.insert_resource(Transports::new(Arc::new(PanickingTransport)));
        app.add_plugins(DeepBotPlugin);

        let e = app.world_mut().spawn(ChatSession::new(None, "hi")).id();
        {
            let mut commands = app.world_mut().commands();
            super::send_user_text(&mut commands, e, "hello");
        }
        app.update();
        pump_until(&mut app, |app| !session(app, e).awaiting());

        let s = session(&app, e);
        assert!(!s.awaiting(), "session stuck awaiting after transport panic");
        assert_eq!(s.state.conversation.len(), 3);
        let last = s.state.conversation.last().expect("reply appended");
        assert_eq!(last.origin(), Origin::Assistant);
        assert!(last.text().starts_with(error::APOLOGY));
        assert!(last.text().contains("transport error"));

        // the session takes new input again
        {
            let mut commands = app.world_mut().commands();
            super::send_user_text(&mut commands, e, "again");
        }
        app.update();
        assert_eq!(session(&app, e).state.conversation.len(), 4);
        let mut ev = app.world_mut().resource_mut::<Events<ChatRejected>>();
        assert_eq!(ev.drain().count(), 0);
    }

    #[test]
    fn panicking_transport_still_finishes_connection_test() {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins);
        app.insert_resource(DeepBotConfig::default());
        app.insert_resource(Transports::new(Arc::new(PanickingTransport)));
        app.add_plugins(DeepBotPlugin);

        app.world_mut().send_event(RunProbe::default());
        app.update();
        pump_until(&mut app, |app| !app.world().resource::<ProbeStatus>().running);

        let status = app.world().resource::<ProbeStatus>();
        assert!(!status.running);
        let result = status.result.as_deref().unwrap_or_default();
        assert!(result.starts_with("❌ ERROR: transport error"), "{result}");
    }
}
