use crossbeam::channel::{unbounded, Receiver, Sender};
use thiserror::Error;

/// Receiving end of an unbounded channel. Thin wrapper so call sites name
/// the concept (`EventConsumer<T>`) instead of the bare crossbeam type.
pub struct EventConsumer<E>(Receiver<E>);

impl<E> From<Receiver<E>> for EventConsumer<E> {
    fn from(value: Receiver<E>) -> Self {
        Self(value)
    }
}

/// Sending end of an unbounded channel.
pub struct EventPublisher<E>(Sender<E>);

impl<E> From<Sender<E>> for EventPublisher<E> {
    fn from(value: Sender<E>) -> Self {
        Self(value)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum EventPublisherError {
    #[error("error while publishing event: {0}")]
    SendError(String),
}

/// Creates a fresh publisher/consumer pair over an unbounded channel.
pub fn pub_sub<E>() -> (EventPublisher<E>, EventConsumer<E>) {
    let (s, r) = unbounded();
    (EventPublisher(s), EventConsumer(r))
}

impl<E> EventPublisher<E> {
    pub fn publish(&self, event: E) -> Result<(), EventPublisherError> {
        self.0
            .send(event)
            .map_err(|err| EventPublisherError::SendError(err.to_string()))
    }
}

impl<E> Clone for EventPublisher<E> {
    fn clone(&self) -> Self {
        EventPublisher(self.0.clone())
    }
}

impl<E> AsRef<Receiver<E>> for EventConsumer<E> {
    fn as_ref(&self) -> &Receiver<E> {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_is_observed_by_consumer() {
        let (publisher, consumer) = pub_sub::<u32>();
        publisher.publish(42).unwrap();
        assert_eq!(consumer.as_ref().recv().unwrap(), 42);
    }
}
