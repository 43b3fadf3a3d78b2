use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};

use crate::config::PushConfig;
use crate::ws::connection::{Frame, InboundFrame, PushConnection, PushSink, PushStream};
use crate::ws::session::Session;

/// Start the three duties of a session on its tracker: delivery loop,
/// liveness probe and inbound drain. The tracker is closed afterwards so
/// `Session::closed` resolves once they have all exited.
pub(crate) fn spawn_session<C: PushConnection>(
    session: &Arc<Session>,
    connection: C,
    outbound: mpsc::Receiver<Frame>,
    config: &PushConfig,
) {
    let (sink, stream) = connection.split();
    let sink = Arc::new(Mutex::new(sink));

    session.tasks.spawn(delivery_loop(
        session.clone(),
        sink.clone(),
        outbound,
        config.write_timeout(),
    ));
    session.tasks.spawn(liveness_probe(
        session.clone(),
        sink,
        config.ping_interval(),
        config.ping_timeout(),
    ));
    session.tasks.spawn(inbound_drain(session.clone(), stream));
    session.tasks.close();
}

/// Writes queued frames in order. Write failures are logged and absorbed:
/// only cancellation ends the loop, after which the connection is closed.
async fn delivery_loop<S: PushSink>(
    session: Arc<Session>,
    sink: Arc<Mutex<S>>,
    mut outbound: mpsc::Receiver<Frame>,
    write_timeout: Duration,
) {
    let cancel = session.token();

    loop {
        let frame = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            frame = outbound.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };

        let mut sink = sink.lock().await;
        match timeout(write_timeout, sink.send_text(frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::debug!(
                    session_id = %session.id(),
                    user_id = %session.user_id(),
                    error = %e,
                    "Push write failed"
                );
            }
            Err(_) => {
                tracing::debug!(
                    session_id = %session.id(),
                    user_id = %session.user_id(),
                    "Push write timed out"
                );
            }
        }
    }

    // Release the queue before closing so late enqueues fail fast.
    drop(outbound);

    let mut sink = sink.lock().await;
    if let Ok(Err(e)) = timeout(write_timeout, sink.close()).await {
        tracing::debug!(session_id = %session.id(), error = %e, "Close frame not delivered");
    }
}

/// Sends a protocol ping every `every`, each bounded by `deadline`.
/// Failures are ignored; peer loss is detected by the inbound drain.
async fn liveness_probe<S: PushSink>(
    session: Arc<Session>,
    sink: Arc<Mutex<S>>,
    every: Duration,
    deadline: Duration,
) {
    let cancel = session.token();
    // First ping one full interval after the connection opens.
    let mut ticker = interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let sent = timeout(deadline, async {
            let mut sink = sink.lock().await;
            sink.send_ping().await
        })
        .await;

        match sent {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::debug!(session_id = %session.id(), error = %e, "Ping failed");
            }
            Err(_) => {
                tracing::debug!(session_id = %session.id(), "Ping timed out");
            }
        }
    }
}

/// Reads the connection only to notice the peer leaving. Any application
/// data is treated as a protocol violation and ends the session too.
async fn inbound_drain<R: PushStream>(session: Arc<Session>, mut stream: R) {
    let cancel = session.token();

    loop {
        let frame = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            frame = stream.next_frame() => frame,
        };

        match frame {
            Some(Ok(InboundFrame::Control)) => continue,
            Some(Ok(InboundFrame::Data)) => {
                tracing::warn!(
                    session_id = %session.id(),
                    user_id = %session.user_id(),
                    "Client sent application data on push-only channel"
                );
                break;
            }
            Some(Ok(InboundFrame::Close(code))) => {
                tracing::info!(
                    session_id = %session.id(),
                    user_id = %session.user_id(),
                    code = ?code,
                    "Client initiated close"
                );
                break;
            }
            Some(Err(e)) => {
                tracing::warn!(
                    session_id = %session.id(),
                    user_id = %session.user_id(),
                    error = %e,
                    "Push connection receive error"
                );
                break;
            }
            None => {
                tracing::info!(session_id = %session.id(), "Push stream ended");
                break;
            }
        }
    }

    session.notify_peer_closed();
}
