use crate::error::SessionError;
use crate::generic_types::{LiveSessionConfig, MediaChunk, ProviderEvent};
use crate::persona::Persona;
use crate::realtime_api::{LiveSession, SpeechProvider};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Active,
    Closing,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

type CurrentSession = Arc<RwLock<Option<Arc<dyn LiveSession>>>>;

/// Fire-and-forget handle capture code uses to push media.
///
/// It always targets whichever session is current and silently drops media
/// while there is none, so capture never waits on a handoff.
#[derive(Clone)]
pub struct MediaSender {
    current: CurrentSession,
    muted: Arc<AtomicBool>,
}

impl MediaSender {
    fn new(current: CurrentSession) -> Self {
        Self {
            current,
            muted: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn send(&self, media: MediaChunk) {
        if self.muted.load(Ordering::Relaxed) {
            return;
        }
        let session = match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        if let Some(session) = session {
            if let Err(err) = session.send_realtime_input(media) {
                tracing::trace!(error = %err, "dropping media chunk");
            }
        }
    }

    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::Relaxed);
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }
}

/// Clears the in-flight flag however the activation ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// The one live provider connection of an interview.
///
/// Switching persona closes the old session, waits out a settle delay, and
/// only then connects the new one. Only one activation may run at a time.
pub struct StreamingSession {
    provider: Arc<dyn SpeechProvider>,
    state: Mutex<SessionState>,
    in_flight: AtomicBool,
    current: CurrentSession,
    media: MediaSender,
    settle_delay: Duration,
}

impl StreamingSession {
    pub fn new(provider: Arc<dyn SpeechProvider>, settle_delay: Duration) -> Self {
        let current: CurrentSession = Arc::new(RwLock::new(None));
        Self {
            provider,
            state: Mutex::new(SessionState::Idle),
            in_flight: AtomicBool::new(false),
            media: MediaSender::new(current.clone()),
            current,
            settle_delay,
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_state(&self, next: SessionState) {
        let mut state = self.lock_state();
        tracing::debug!(from = %*state, to = %next, "streaming session state");
        *state = next;
    }

    pub fn state(&self) -> SessionState {
        *self.lock_state()
    }

    pub fn media_sender(&self) -> MediaSender {
        self.media.clone()
    }

    pub fn current(&self) -> Option<Arc<dyn LiveSession>> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn replace_current(&self, next: Option<Arc<dyn LiveSession>>) -> Option<Arc<dyn LiveSession>> {
        let mut guard = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::replace(&mut *guard, next)
    }

    /// Brings `persona` live with `instructions` and returns its event stream.
    ///
    /// Any current session is closed first (errors are logged, not returned)
    /// followed by the settle delay. A failed handshake leaves the machine
    /// `Closed` with no current session. While another activation is still
    /// running this fails with `ActivationInFlight` and changes nothing.
    pub async fn activate(
        &self,
        persona: &Persona,
        instructions: String,
    ) -> Result<mpsc::Receiver<ProviderEvent>, SessionError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::warn!(persona = %persona.id, "activation already in flight, ignoring request");
            return Err(SessionError::ActivationInFlight);
        }
        let _guard = InFlight(&self.in_flight);

        self.close_current().await;

        self.set_state(SessionState::Connecting);
        let config = LiveSessionConfig::new(persona.voice.clone(), instructions);
        match self.provider.connect(config).await {
            Ok(connection) => {
                self.replace_current(Some(connection.session));
                self.set_state(SessionState::Active);
                tracing::info!(persona = %persona.id, voice = %persona.voice, "persona session active");
                Ok(connection.events)
            }
            Err(err) => {
                self.set_state(SessionState::Closed);
                tracing::error!(persona = %persona.id, error = %err, "persona session handshake failed");
                Err(SessionError::Handshake(format!("{err:#}")))
            }
        }
    }

    /// Graceful close of whatever is live, then the settle delay.
    async fn close_current(&self) {
        let Some(previous) = self.replace_current(None) else {
            return;
        };
        self.set_state(SessionState::Closing);
        if let Err(err) = previous.close().await {
            tracing::warn!(error = %err, "closing previous session failed");
        }
        tokio::time::sleep(self.settle_delay).await;
        self.set_state(SessionState::Closed);
    }

    /// Immediate detach for call end: media stops flowing at once and the
    /// returned session can be closed in the background.
    pub fn detach(&self) -> Option<Arc<dyn LiveSession>> {
        let previous = self.replace_current(None);
        self.set_state(SessionState::Closed);
        previous
    }

    /// Sends guidance to the live persona, if any.
    pub fn steer(&self, text: &str) {
        if let Some(session) = self.current() {
            if let Err(err) = session.send_guidance(text) {
                tracing::warn!(error = %err, "could not steer live session");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persona::default_roster;
    use crate::realtime_api::{LiveConnection, MockLiveSession};
    use anyhow::{Result, anyhow};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct FakeProvider {
        connects: AtomicUsize,
        fail: bool,
        delay: Duration,
    }

    #[async_trait]
    impl SpeechProvider for FakeProvider {
        async fn connect(&self, _config: LiveSessionConfig) -> Result<LiveConnection> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(anyhow!("setup rejected"));
            }
            let mut session = MockLiveSession::new();
            session.expect_close().returning(|| Ok(()));
            session.expect_send_realtime_input().returning(|_| Ok(()));
            let (_tx, events) = mpsc::channel(1);
            Ok(LiveConnection {
                session: Arc::new(session),
                events,
            })
        }
    }

    fn provider(fail: bool, delay: Duration) -> Arc<FakeProvider> {
        Arc::new(FakeProvider {
            connects: AtomicUsize::new(0),
            fail,
            delay,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_activation_reaches_active() {
        let roster = default_roster();
        let session = StreamingSession::new(provider(false, Duration::ZERO), Duration::from_millis(250));
        assert_eq!(session.state(), SessionState::Idle);
        session.activate(&roster[0], "hi".into()).await.unwrap();
        assert_eq!(session.state(), SessionState::Active);
        assert!(session.current().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_activation_is_rejected() {
        let roster = default_roster();
        let fake = provider(false, Duration::from_millis(100));
        let session = Arc::new(StreamingSession::new(fake.clone(), Duration::from_millis(250)));

        let first = {
            let session = session.clone();
            let persona = roster[0].clone();
            tokio::spawn(async move { session.activate(&persona, "a".into()).await })
        };
        tokio::task::yield_now().await;
        let second = session.activate(&roster[1], "b".into()).await;
        assert!(matches!(second, Err(SessionError::ActivationInFlight)));

        assert!(first.await.unwrap().is_ok());
        assert_eq!(fake.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_switch_closes_previous_and_waits_settle_delay() {
        let roster = default_roster();
        let session = StreamingSession::new(provider(false, Duration::ZERO), Duration::from_millis(250));
        session.activate(&roster[0], "a".into()).await.unwrap();

        let started = tokio::time::Instant::now();
        session.activate(&roster[1], "b".into()).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(250));
        assert_eq!(session.state(), SessionState::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_handshake_leaves_no_session() {
        let roster = default_roster();
        let session = StreamingSession::new(provider(true, Duration::ZERO), Duration::from_millis(10));
        let err = session.activate(&roster[0], "a".into()).await.err().unwrap();
        assert!(matches!(err, SessionError::Handshake(_)));
        assert_eq!(session.state(), SessionState::Closed);
        assert!(session.current().is_none());

        // The guard is released, so a retry is allowed.
        let err = session.activate(&roster[0], "a".into()).await.err().unwrap();
        assert!(matches!(err, SessionError::Handshake(_)));
    }

    #[test]
    fn test_media_sender_is_a_no_op_without_session() {
        let session = StreamingSession::new(provider(false, Duration::ZERO), Duration::ZERO);
        let sender = session.media_sender();
        sender.send(MediaChunk {
            data: vec![0, 0],
            mime_type: "audio/pcm;rate=16000".into(),
        });
        sender.set_muted(true);
        assert!(sender.is_muted());
    }

    #[test]
    fn test_media_sender_targets_current_session() {
        let session = StreamingSession::new(provider(false, Duration::ZERO), Duration::ZERO);
        let mut live = MockLiveSession::new();
        live.expect_send_realtime_input().times(1).returning(|_| Ok(()));
        session.replace_current(Some(Arc::new(live)));

        let sender = session.media_sender();
        let chunk = MediaChunk {
            data: vec![1, 0],
            mime_type: "audio/pcm;rate=16000".into(),
        };
        sender.send(chunk.clone());
        sender.set_muted(true);
        sender.send(chunk);
    }
}
