use crate::actors::messages::AssistantMessage;
use crate::api::{Request, Response};
use crate::service::AssistantService;
use tokio::sync::mpsc::{channel, Receiver, Sender};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub struct AssistantActorHandle {
    sender: Sender<AssistantMessage>,
    task: JoinHandle<()>,
}

impl AssistantActorHandle {
    pub fn new(service: AssistantService, buffer_size: usize) -> Self {
        let (sender, receiver) = channel(buffer_size.max(1));
        let task = tokio::spawn(assistant_actor(receiver, service));
        Self { sender, task }
    }

    pub async fn request(&self, request: Request) -> anyhow::Result<Response> {
        let (response_tx, response_rx) = oneshot::channel();
        self.sender
            .send(AssistantMessage::Request {
                request,
                response: response_tx,
            })
            .await
            .map_err(|e| anyhow::anyhow!("Failed to send request to Assistant actor: {}", e))?;

        response_rx
            .await
            .map_err(|_| anyhow::anyhow!("Assistant actor dropped the request"))
    }

    /// Stop accepting requests and wait for the actor loop to exit
    pub async fn shutdown(self) -> anyhow::Result<()> {
        // A closed channel means the loop already stopped
        let _ = self.sender.send(AssistantMessage::Shutdown).await;
        self.task
            .await
            .map_err(|e| anyhow::anyhow!("Assistant actor panicked: {}", e))
    }
}

async fn assistant_actor(mut receiver: Receiver<AssistantMessage>, service: AssistantService) {
    tracing::info!("[AssistantActor] Started");

    while let Some(message) = receiver.recv().await {
        match message {
            AssistantMessage::Request { request, response } => {
                if request.is_remote() {
                    // Completion calls may take seconds; answer them out of order
                    let service = service.clone();
                    tokio::spawn(async move {
                        let result = service.dispatch(request).await;
                        let _ = response.send(result);
                    });
                } else {
                    let result = service.dispatch(request).await;
                    let _ = response.send(result);
                }
            }
            AssistantMessage::Shutdown => {
                tracing::info!("[AssistantActor] Received shutdown signal");
                break;
            }
        }
    }

    tracing::info!("[AssistantActor] Stopped");
}
