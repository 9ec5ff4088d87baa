use tokio::sync::broadcast;

use crate::error::Error;

pub type ShutdownReceiver = broadcast::Receiver<Shutdown>;
pub type ShutdownSender = broadcast::Sender<Shutdown>;

/// The single process-wide termination signal. Every long running task
/// subscribes when it is built and stops on the first value it sees.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Shutdown {
    Interrupt,
    Fatal(String),
}

impl Shutdown {
    pub async fn build() -> ShutdownSender {
        let (shutdown_sender, _shutdown_receiver) = broadcast::channel::<Shutdown>(64);

        shutdown_sender
    }

    pub async fn interrupt(shutdown: &ShutdownSender) {
        let _ = shutdown.send(Shutdown::Interrupt);
    }

    /// Raises the signal for an unrecoverable error. Delivery only fails when
    /// nothing is subscribed, in which case everything has already stopped.
    pub async fn fatal(shutdown: &ShutdownSender, error: &Error) {
        let _ = shutdown.send(Shutdown::Fatal(error.to_string()));
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Shutdown::Fatal(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn build() -> Result<(), Box<dyn std::error::Error>> {
        let test_shutdown = Shutdown::build().await;

        assert_eq!(test_shutdown.receiver_count(), 0);

        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn fatal() -> Result<(), Box<dyn std::error::Error>> {
        let test_shutdown = Shutdown::build().await;
        let mut test_first = test_shutdown.subscribe();
        let mut test_second = test_shutdown.subscribe();

        Shutdown::fatal(&test_shutdown, &Error::Closed("membership table")).await;

        let test_signal = test_first.recv().await?;

        assert!(test_signal.is_fatal());
        assert_eq!(test_second.recv().await?, test_signal);

        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn interrupt_without_subscribers() -> Result<(), Box<dyn std::error::Error>> {
        let test_shutdown = Shutdown::build().await;

        Shutdown::interrupt(&test_shutdown).await;

        let mut test_late = test_shutdown.subscribe();

        assert!(test_late.try_recv().is_err());

        Ok(())
    }
}
