use crate::api::{Request, Response};
use crate::cache::CleanupReport;
use tokio::sync::oneshot;

#[derive(Debug)]
pub enum AssistantMessage {
    Request {
        request: Request,
        response: oneshot::Sender<Response>,
    },
    Shutdown,
}

#[derive(Debug)]
pub enum CleanupMessage {
    /// Sweep now, outside the schedule
    RunNow(oneshot::Sender<Result<CleanupReport, String>>),
    Shutdown,
}
