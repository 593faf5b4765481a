use thiserror::Error;

/// Errors raised while talking to the message broker.
#[derive(Debug, Error)]
pub enum MessagingError {
    /// The broker could not be reached or refused the connection.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The broker did not accept a published message.
    #[error("Publish error: {0}")]
    Publish(String),

    /// Subscribing to a queue failed or the delivery stream broke.
    #[error("Consume error: {0}")]
    Consume(String),

    /// An ACK or NACK could not be sent.
    #[error("Acknowledgement error: {0}")]
    Ack(String),

    /// The channel was used after it was closed.
    #[error("Channel closed")]
    ChannelClosed,

    /// An AMQP client error.
    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),

    /// An error occurred in the store.
    #[error("Store error: {0}")]
    Store(#[from] store::StoreError),
}

/// Result type for messaging operations.
pub type Result<T> = std::result::Result<T, MessagingError>;
