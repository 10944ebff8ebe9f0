//! In-process topic foyer.
//!
//! # Responsibilities
//! - Accept published messages from `TopicPublisher` handles
//! - Run each message through the rendezvous in its own task
//! - Deliver the acknowledgement back to the publisher, bounded by a reply timeout
//!
//! # Design Decisions
//! - The channel exists from construction, so publishers can be handed out
//!   before the aggregator starts; messages queue until `open`
//! - After `close`, publishing fails with `FoyerError::Closed`

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::foyer::{Foyer, FoyerError};
use crate::lifecycle::Shutdown;
use crate::model::Scheme;
use crate::protocol::topic::{TopicInput, TopicOutput};
use crate::rendezvous::Rendezvous;

const DEFAULT_CAPACITY: usize = 1024;

struct Publication {
    input: TopicInput,
    reply: oneshot::Sender<TopicOutput>,
}

/// Handle for publishing into a [`TopicFoyer`].
#[derive(Clone)]
pub struct TopicPublisher {
    name: String,
    tx: mpsc::Sender<Publication>,
    reply_timeout: Duration,
}

impl TopicPublisher {
    /// Same channel, different publisher name.
    pub fn named(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }

    /// Publish `payload` on `topic` and wait for the acknowledgement.
    pub async fn publish(
        &self,
        topic: impl Into<String>,
        payload: impl Into<Vec<u8>>,
    ) -> Result<TopicOutput, FoyerError> {
        let (reply, rx) = oneshot::channel();
        let publication = Publication {
            input: TopicInput::new(topic, self.name.clone(), payload),
            reply,
        };
        self.tx
            .send(publication)
            .await
            .map_err(|_| FoyerError::Closed)?;

        match tokio::time::timeout(self.reply_timeout, rx).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(_)) => Err(FoyerError::Closed),
            Err(_) => Err(FoyerError::ReplyTimeout(self.reply_timeout)),
        }
    }
}

impl std::fmt::Debug for TopicPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopicPublisher")
            .field("name", &self.name)
            .field("reply_timeout", &self.reply_timeout)
            .finish()
    }
}

struct Running {
    shutdown: Shutdown,
    task: JoinHandle<()>,
}

pub struct TopicFoyer {
    publisher: TopicPublisher,
    rx: Option<mpsc::Receiver<Publication>>,
    running: Option<Running>,
}

impl TopicFoyer {
    pub fn new(reply_timeout: Duration) -> Self {
        Self::with_capacity(DEFAULT_CAPACITY, reply_timeout)
    }

    pub fn with_capacity(capacity: usize, reply_timeout: Duration) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            publisher: TopicPublisher {
                name: "local".to_string(),
                tx,
                reply_timeout,
            },
            rx: Some(rx),
            running: None,
        }
    }

    pub fn publisher(&self) -> TopicPublisher {
        self.publisher.clone()
    }
}

impl std::fmt::Debug for TopicFoyer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopicFoyer")
            .field("open", &self.running.is_some())
            .finish()
    }
}

impl Foyer for TopicFoyer {
    type Input = TopicInput;
    type Output = TopicOutput;

    fn scheme(&self) -> Scheme {
        Scheme::TOPIC
    }

    fn open(&mut self, rendezvous: Arc<Rendezvous<TopicInput, TopicOutput>>) -> Result<(), FoyerError> {
        if self.running.is_some() {
            return Err(FoyerError::AlreadyOpen);
        }
        let mut rx = self.rx.take().ok_or(FoyerError::Closed)?;
        let shutdown = Shutdown::new();
        let signal = shutdown.clone();

        let task = tokio::spawn(async move {
            loop {
                let publication = tokio::select! {
                    _ = signal.wait() => break,
                    next = rx.recv() => match next {
                        Some(publication) => publication,
                        None => break,
                    },
                };

                let rendezvous = Arc::clone(&rendezvous);
                tokio::spawn(async move {
                    let Publication { input, reply } = publication;
                    let topic = input.topic.clone();
                    let output = match tokio::spawn(async move { rendezvous.encounter(input).await }).await {
                        Ok(output) => output,
                        Err(e) => {
                            tracing::error!(topic = %topic, error = %e, "Pipeline task failed");
                            TopicOutput::internal_error()
                        }
                    };
                    if reply.send(output).is_err() {
                        tracing::debug!(topic = %topic, "Publisher stopped waiting for acknowledgement");
                    }
                });
            }
            rx.close();
        });

        tracing::info!(scheme = %Scheme::TOPIC, "Foyer listening");
        self.running = Some(Running { shutdown, task });
        Ok(())
    }

    fn close(&mut self) -> BoxFuture<'_, Result<(), FoyerError>> {
        let running = self.running.take();
        async move {
            let Some(running) = running else {
                return Ok(());
            };
            running.shutdown.trigger();
            running
                .task
                .await
                .map_err(|e| FoyerError::Serve(e.to_string()))?;
            tracing::info!(scheme = %Scheme::TOPIC, "Foyer closed");
            Ok(())
        }
        .boxed()
    }

    fn is_open(&self) -> bool {
        self.running.is_some()
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        None
    }
}
