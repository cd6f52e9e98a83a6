pub mod test_helpers {
    use crate::error::InstanceError;
    use crate::mcp::instance::{Instance, InstanceFactory, InstanceId, Transport};
    use crate::mcp::registry::ServerList;
    use crate::watchdog::ProcessExit;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::sync::Notify;
    use tokio::time::Instant;
    use tokio_util::sync::CancellationToken;

    /// How a [`FakeInstance`] reacts to `close`
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum CloseBehavior {
        Succeed,
        Fail,
        Hang,
    }

    /// Instance double that echoes every frame it receives
    pub struct FakeInstance {
        id: InstanceId,
        behavior: CloseBehavior,
        fail_connect: bool,
        connect_delay: Duration,
        connected: AtomicBool,
        received: Arc<AtomicUsize>,
        close_calls: AtomicUsize,
        ct: CancellationToken,
        finished: CancellationToken,
    }

    impl FakeInstance {
        pub fn new(behavior: CloseBehavior) -> Self {
            Self {
                id: InstanceId::next(),
                behavior,
                fail_connect: false,
                connect_delay: Duration::ZERO,
                connected: AtomicBool::new(false),
                received: Arc::new(AtomicUsize::new(0)),
                close_calls: AtomicUsize::new(0),
                ct: CancellationToken::new(),
                finished: CancellationToken::new(),
            }
        }

        pub fn failing_connect() -> Self {
            Self {
                fail_connect: true,
                ..Self::new(CloseBehavior::Succeed)
            }
        }

        pub fn close_calls(&self) -> usize {
            self.close_calls.load(Ordering::SeqCst)
        }

        /// Frames read from the transport so far
        pub fn received(&self) -> usize {
            self.received.load(Ordering::SeqCst)
        }

        pub fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }

        pub fn is_finished(&self) -> bool {
            self.finished.is_cancelled()
        }
    }

    #[async_trait]
    impl Instance for FakeInstance {
        fn id(&self) -> InstanceId {
            self.id
        }

        async fn connect(&self, transport: Transport) -> Result<(), InstanceError> {
            if !self.connect_delay.is_zero() {
                tokio::time::sleep(self.connect_delay).await;
            }
            if self.fail_connect {
                return Err(InstanceError::Connect("refused by test".to_string()));
            }
            self.connected.store(true, Ordering::SeqCst);

            let ct = self.ct.clone();
            let finished = self.finished.clone();
            let received = Arc::clone(&self.received);
            tokio::spawn(async move {
                let (reader, mut writer) = transport.into_parts();
                let mut lines = BufReader::new(reader).lines();
                loop {
                    tokio::select! {
                        _ = ct.cancelled() => break,
                        line = lines.next_line() => match line {
                            Ok(Some(line)) => {
                                received.fetch_add(1, Ordering::SeqCst);
                                let echoed = format!("{}\n", line);
                                if writer.write_all(echoed.as_bytes()).await.is_err()
                                    || writer.flush().await.is_err()
                                {
                                    break;
                                }
                            }
                            _ => break,
                        },
                    }
                }
                finished.cancel();
            });

            Ok(())
        }

        async fn closed(&self) {
            self.finished.cancelled().await;
        }

        async fn close(&self) -> Result<(), InstanceError> {
            self.close_calls.fetch_add(1, Ordering::SeqCst);
            match self.behavior {
                CloseBehavior::Succeed => {
                    self.ct.cancel();
                    self.finished.cancel();
                    Ok(())
                }
                CloseBehavior::Fail => {
                    self.ct.cancel();
                    self.finished.cancel();
                    Err(InstanceError::Close("failed by test".to_string()))
                }
                CloseBehavior::Hang => std::future::pending().await,
            }
        }
    }

    /// Factory double recording every instance it produced
    pub struct FakeFactory {
        behaviors: Mutex<Vec<CloseBehavior>>,
        fail_create: AtomicBool,
        fail_connect: AtomicBool,
        create_delay: Mutex<Duration>,
        connect_delay: Mutex<Duration>,
        created: Mutex<Vec<Arc<FakeInstance>>>,
    }

    impl FakeFactory {
        pub fn new() -> Self {
            Self {
                behaviors: Mutex::new(Vec::new()),
                fail_create: AtomicBool::new(false),
                fail_connect: AtomicBool::new(false),
                create_delay: Mutex::new(Duration::ZERO),
                connect_delay: Mutex::new(Duration::ZERO),
                created: Mutex::new(Vec::new()),
            }
        }

        /// Close behaviors handed out in order; once exhausted instances close normally
        pub fn with_behaviors(behaviors: Vec<CloseBehavior>) -> Self {
            let factory = Self::new();
            *factory.behaviors.lock().unwrap() = behaviors.into_iter().rev().collect();
            factory
        }

        pub fn set_fail_create(&self, fail: bool) {
            self.fail_create.store(fail, Ordering::SeqCst);
        }

        pub fn set_fail_connect(&self, fail: bool) {
            self.fail_connect.store(fail, Ordering::SeqCst);
        }

        /// Makes every `create` take `delay` before producing an instance
        pub fn set_create_delay(&self, delay: Duration) {
            *self.create_delay.lock().unwrap() = delay;
        }

        /// Makes every produced instance take `delay` to connect
        pub fn set_connect_delay(&self, delay: Duration) {
            *self.connect_delay.lock().unwrap() = delay;
        }

        pub fn created(&self) -> Vec<Arc<FakeInstance>> {
            self.created.lock().unwrap().clone()
        }

        pub fn created_count(&self) -> usize {
            self.created.lock().unwrap().len()
        }
    }

    impl Default for FakeFactory {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl InstanceFactory for FakeFactory {
        async fn create(&self) -> Result<Arc<dyn Instance>, InstanceError> {
            let delay = *self.create_delay.lock().unwrap();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            if self.fail_create.load(Ordering::SeqCst) {
                return Err(InstanceError::Creation("refused by test".to_string()));
            }

            let mut instance = if self.fail_connect.load(Ordering::SeqCst) {
                FakeInstance::failing_connect()
            } else {
                let behavior = self
                    .behaviors
                    .lock()
                    .unwrap()
                    .pop()
                    .unwrap_or(CloseBehavior::Succeed);
                FakeInstance::new(behavior)
            };
            instance.connect_delay = *self.connect_delay.lock().unwrap();

            let instance = Arc::new(instance);
            self.created.lock().unwrap().push(Arc::clone(&instance));
            Ok(instance)
        }
    }

    /// Server list backed by a [`FakeFactory`] the test keeps a handle on
    pub fn fake_server_list(factory: FakeFactory) -> (Arc<ServerList>, Arc<FakeFactory>) {
        let factory = Arc::new(factory);
        let servers = Arc::new(ServerList::new(factory.clone()));
        (servers, factory)
    }

    /// [`ProcessExit`] that records exits instead of terminating
    #[derive(Default)]
    pub struct RecordingExit {
        calls: Mutex<Vec<(i32, Instant)>>,
        notify: Notify,
    }

    impl RecordingExit {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn calls(&self) -> Vec<(i32, Instant)> {
            self.calls.lock().unwrap().clone()
        }

        /// Waits until at least one exit has been recorded
        pub async fn wait_for_exit(&self) -> (i32, Instant) {
            loop {
                let notified = self.notify.notified();
                if let Some(first) = self.calls.lock().unwrap().first().copied() {
                    return first;
                }
                notified.await;
            }
        }
    }

    impl ProcessExit for RecordingExit {
        fn exit(&self, code: i32) {
            self.calls.lock().unwrap().push((code, Instant::now()));
            self.notify.notify_waiters();
        }
    }
}
