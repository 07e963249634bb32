//! # Example: ten producers, one activator
//!
//! Ten tasks send into a [`ReactiveChannel`] consumed by a [`ServiceActivator`].
//! Replies land in a queue; the sender of the failing payload gets the full
//! `DeliveryError -> HandlingError -> cause` chain back.

use std::sync::Arc;

use fluxgate::{
    BoxError, Bus, ChannelRef, HandlerSubscriber, LogWriter, Message, MessageChannel,
    PollableChannel, QueueChannel, ReactiveChannel, ServiceActivator,
};

#[derive(Debug, thiserror::Error)]
#[error("payload {0} is not accepted")]
struct Rejected(u32);

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), BoxError> {
    let bus = Bus::new(256);
    let _log = LogWriter::new().spawn(&bus);

    let input = Arc::new(ReactiveChannel::<u32>::new("input").with_bus(bus));
    let replies = Arc::new(QueueChannel::<String>::new("replies"));

    let echo = ServiceActivator::new("echo", |n: u32| {
        if n == 5 {
            Err(Rejected(n))
        } else {
            Ok(format!("reply-{n}"))
        }
    });
    input.subscribe(HandlerSubscriber::<u32>::arc(echo.into_arc())).await?;

    let mut senders = Vec::new();
    for n in 0..10_u32 {
        let input = Arc::clone(&input);
        let reply_to = ChannelRef::of(&replies);
        senders.push(tokio::spawn(async move {
            let msg = Message::builder(n).reply_channel(reply_to).build();
            (n, input.send(msg).await)
        }));
    }

    for sender in senders {
        let (n, res) = sender.await?;
        match res {
            Ok(()) => println!("[sender {n}] delivered"),
            Err(err) => {
                println!("[sender {n}] failed: {err}");
                if let Some(delivery) = err.as_delivery() {
                    for (depth, cause) in delivery.chain().enumerate() {
                        println!("    {depth}: {cause}");
                    }
                }
            }
        }
    }

    while let Some(reply) = replies.try_receive() {
        println!("[replies] {}", reply.into_payload());
    }

    input.complete().await;
    Ok(())
}
