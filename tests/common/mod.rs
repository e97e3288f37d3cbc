//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::time::Instant;

use whisper_relay::adapters::{
    DocumentSource, InferenceBackend, Messenger, PredictRequest, RemoteFile,
};
use whisper_relay::core::{
    AdmissionController, Backends, DispatchSettings, Dispatcher, IntakeLimits, JobIntake,
    QueueSet,
};
use whisper_relay::domain::{
    Capability, ChatKind, IncomingMessage, Job, MediaAttachment, MediaKind, MessageHandle,
    Submitter,
};
use whisper_relay::ingest::{MediaFetcher, MediaLimits};

/// One recorded messenger call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    GetFile(String),
    Download(String),
    Send { chat_id: i64, text: String },
    Reply { to: MessageHandle, text: String, sent: MessageHandle },
    Edit { message: MessageHandle, text: String },
    Forward { message: MessageHandle, to_chat: i64 },
    Document { to: MessageHandle, source: String },
}

/// In-memory messenger that records every call
pub struct RecordingMessenger {
    calls: Mutex<Vec<Call>>,
    next_message_id: AtomicI64,
    files: Mutex<HashMap<String, RemoteFile>>,
    fail_edits: AtomicBool,
    fail_downloads: AtomicBool,
    /// Replies that may still succeed (`None` = unlimited)
    reply_budget: Mutex<Option<usize>>,
    unreachable_chats: Mutex<HashSet<i64>>,
    refused_texts: Mutex<HashSet<String>>,
}

impl Default for RecordingMessenger {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            next_message_id: AtomicI64::new(1000),
            files: Mutex::new(HashMap::new()),
            fail_edits: AtomicBool::new(false),
            fail_downloads: AtomicBool::new(false),
            reply_budget: Mutex::new(None),
            unreachable_chats: Mutex::new(HashSet::new()),
            refused_texts: Mutex::new(HashSet::new()),
        }
    }
}

impl RecordingMessenger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make `get_file` return this metadata for `file_id`
    pub fn register_file(&self, file_id: &str, path: &str, size: Option<u64>) {
        self.files.lock().unwrap().insert(
            file_id.to_string(),
            RemoteFile {
                path: path.to_string(),
                size,
            },
        );
    }

    pub fn fail_edits(&self) {
        self.fail_edits.store(true, Ordering::SeqCst);
    }

    pub fn fail_downloads(&self) {
        self.fail_downloads.store(true, Ordering::SeqCst);
    }

    /// Let only the next `n` replies succeed
    pub fn allow_replies(&self, n: usize) {
        *self.reply_budget.lock().unwrap() = Some(n);
    }

    /// Make every reply with exactly this text fail
    pub fn refuse_reply(&self, text: &str) {
        self.refused_texts.lock().unwrap().insert(text.to_string());
    }

    pub fn make_unreachable(&self, chat_id: i64) {
        self.unreachable_chats.lock().unwrap().insert(chat_id);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Texts of every reply and edit, in call order
    pub fn texts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Reply { text, .. } | Call::Edit { text, .. } | Call::Send { text, .. } => {
                    Some(text)
                }
                _ => None,
            })
            .collect()
    }

    pub fn replies(&self) -> Vec<(MessageHandle, String)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Reply { to, text, .. } => Some((to, text)),
                _ => None,
            })
            .collect()
    }

    pub fn edits(&self) -> Vec<(MessageHandle, String)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Edit { message, text } => Some((message, text)),
                _ => None,
            })
            .collect()
    }

    pub fn sent(&self) -> Vec<(i64, String)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Send { chat_id, text } => Some((chat_id, text)),
                _ => None,
            })
            .collect()
    }

    pub fn contains_text(&self, needle: &str) -> bool {
        self.texts().iter().any(|t| t == needle)
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn new_handle(&self, chat_id: i64) -> MessageHandle {
        MessageHandle::new(chat_id, self.next_message_id.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn get_file(&self, file_id: &str) -> Result<RemoteFile> {
        self.record(Call::GetFile(file_id.to_string()));
        let registered = self.files.lock().unwrap().get(file_id).cloned();
        Ok(registered.unwrap_or_else(|| RemoteFile {
            path: format!("voice/{}.oga", file_id),
            size: None,
        }))
    }

    async fn download(&self, path: &str) -> Result<Vec<u8>> {
        self.record(Call::Download(path.to_string()));
        if self.fail_downloads.load(Ordering::SeqCst) {
            bail!("download refused");
        }
        Ok(format!("bytes of {}", path).into_bytes())
    }

    async fn send(&self, chat_id: i64, text: &str) -> Result<MessageHandle> {
        self.record(Call::Send {
            chat_id,
            text: text.to_string(),
        });
        if self.unreachable_chats.lock().unwrap().contains(&chat_id) {
            bail!("chat not found");
        }
        Ok(self.new_handle(chat_id))
    }

    async fn reply(&self, to: &MessageHandle, text: &str) -> Result<MessageHandle> {
        if self.refused_texts.lock().unwrap().contains(text) {
            bail!("reply refused");
        }
        {
            let mut budget = self.reply_budget.lock().unwrap();
            if let Some(left) = budget.as_mut() {
                if *left == 0 {
                    bail!("reply refused");
                }
                *left -= 1;
            }
        }
        let sent = self.new_handle(to.chat_id);
        self.record(Call::Reply {
            to: *to,
            text: text.to_string(),
            sent,
        });
        Ok(sent)
    }

    async fn edit(&self, message: &MessageHandle, text: &str) -> Result<MessageHandle> {
        if self.fail_edits.load(Ordering::SeqCst) {
            bail!("message can't be edited");
        }
        self.record(Call::Edit {
            message: *message,
            text: text.to_string(),
        });
        Ok(*message)
    }

    async fn forward(&self, message: &MessageHandle, to_chat: i64) -> Result<MessageHandle> {
        self.record(Call::Forward {
            message: *message,
            to_chat,
        });
        if self.unreachable_chats.lock().unwrap().contains(&to_chat) {
            bail!("chat not found");
        }
        Ok(self.new_handle(to_chat))
    }

    async fn send_document(
        &self,
        to: &MessageHandle,
        document: DocumentSource,
    ) -> Result<MessageHandle> {
        let source = match document {
            DocumentSource::FileId(id) => id,
            DocumentSource::Path(path) => path.display().to_string(),
        };
        self.record(Call::Document { to: *to, source });
        Ok(self.new_handle(to.chat_id))
    }
}

/// What a scripted backend does for one call
#[derive(Debug, Clone)]
pub enum Step {
    Text(String),
    Fail(String),
    Panic,
    /// Never return
    Hang,
}

/// Inference backend driven by a script, optionally gated so tests can hold
/// calls open
pub struct ScriptedBackend {
    name: String,
    script: Mutex<VecDeque<Step>>,
    calls: Mutex<Vec<String>>,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
    gate: Option<Arc<Semaphore>>,
}

struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedBackend {
    fn build(name: &str, gate: Option<Arc<Semaphore>>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            script: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            active: Arc::new(AtomicUsize::new(0)),
            max_active: Arc::new(AtomicUsize::new(0)),
            gate,
        })
    }

    /// Answers immediately; unscripted calls return "text for <payload name>"
    pub fn new(name: &str) -> Arc<Self> {
        Self::build(name, None)
    }

    /// Every call waits for a permit from [`ScriptedBackend::release`]
    pub fn gated(name: &str) -> Arc<Self> {
        Self::build(name, Some(Arc::new(Semaphore::new(0))))
    }

    pub fn push(&self, step: Step) {
        self.script.lock().unwrap().push_back(step);
    }

    /// Let `n` gated calls finish
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    /// Payload names in call order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Highest number of calls that were ever running at once
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InferenceBackend for ScriptedBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn predict(&self, request: PredictRequest) -> Result<String> {
        self.calls.lock().unwrap().push(request.payload_name.clone());
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        let _active = ActiveGuard(Arc::clone(&self.active));

        if let Some(gate) = &self.gate {
            gate.acquire().await?.forget();
        }

        let step = self.script.lock().unwrap().pop_front();
        match step {
            None => Ok(format!("text for {}", request.payload_name)),
            Some(Step::Text(text)) => Ok(text),
            Some(Step::Fail(reason)) => bail!(reason),
            Some(Step::Panic) => panic!("backend exploded"),
            Some(Step::Hang) => std::future::pending().await,
        }
    }
}

/// Everything wired together the way `serve` does it
pub struct Harness {
    pub messenger: Arc<RecordingMessenger>,
    pub transcribe: Arc<ScriptedBackend>,
    pub diarize: Arc<ScriptedBackend>,
    pub dispatcher: Arc<Dispatcher>,
    pub intake: Arc<JobIntake>,
}

pub fn quick_limits() -> IntakeLimits {
    IntakeLimits {
        ordering_unit_delay: Duration::ZERO,
        ..IntakeLimits::default()
    }
}

pub fn settings() -> DispatchSettings {
    DispatchSettings {
        max_message_length: 4096,
        backend_timeout: None,
    }
}

pub fn harness_with(
    transcribe: Arc<ScriptedBackend>,
    diarize: Arc<ScriptedBackend>,
    limits: IntakeLimits,
    settings: DispatchSettings,
) -> Harness {
    let messenger = RecordingMessenger::new();
    let as_messenger: Arc<dyn Messenger> = messenger.clone();
    let backends = Backends {
        transcribe: Some(transcribe.clone() as Arc<dyn InferenceBackend>),
        diarize: Some(diarize.clone() as Arc<dyn InferenceBackend>),
    };

    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&as_messenger),
        backends.clone(),
        settings,
    ));
    let (queues, _workers) = QueueSet::start(Arc::clone(&dispatcher));
    let fetcher = MediaFetcher::new(
        Arc::clone(&as_messenger),
        MediaLimits::default(),
        "transcribe",
        "diarize",
    );
    let intake = Arc::new(JobIntake::new(as_messenger, fetcher, queues, backends, limits));

    Harness {
        messenger,
        transcribe,
        diarize,
        dispatcher,
        intake,
    }
}

pub fn harness(limits: IntakeLimits) -> Harness {
    harness_with(
        ScriptedBackend::new("transcribe"),
        ScriptedBackend::new("diarize"),
        limits,
        settings(),
    )
}

/// A private-chat voice message
pub fn voice(user_id: i64, message_id: i64, file_id: &str) -> IncomingMessage {
    IncomingMessage {
        handle: MessageHandle::new(user_id, message_id),
        chat_kind: ChatKind::Private,
        from: Submitter {
            id: user_id,
            username: Some(format!("user{}", user_id)),
        },
        text: None,
        media: Some(MediaAttachment {
            kind: MediaKind::Voice,
            file_id: file_id.to_string(),
            file_size: Some(2048),
            duration: Some(5),
        }),
        reply_to: None,
    }
}

/// A group-chat `/command` replying to `target`
pub fn command_reply(
    chat_id: i64,
    user_id: i64,
    message_id: i64,
    command: &str,
    target: Option<IncomingMessage>,
) -> IncomingMessage {
    IncomingMessage {
        handle: MessageHandle::new(chat_id, message_id),
        chat_kind: ChatKind::Group,
        from: Submitter {
            id: user_id,
            username: None,
        },
        text: Some(format!("/{}", command)),
        media: None,
        reply_to: target.map(Box::new),
    }
}

/// A job with a free admission slot, for driving queues directly
pub fn job(name: &str, capability: Capability, destination: MessageHandle) -> Job {
    let slot = AdmissionController::new(0)
        .try_admit()
        .expect("unlimited admission always grants a slot");
    Job::new(
        name.as_bytes().to_vec(),
        name.to_string(),
        destination,
        Submitter::default(),
        destination.chat_id,
        capability,
        slot,
    )
}

/// Poll `condition` until it holds, failing the test after a few seconds
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not met in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
