use crate::config::HostConfig;
use crate::error::BridgeError;
use crate::protocol::{ChannelTransport, NativeEnvelope, reader_loop, writer_loop};
use crate::registry::RouteTable;
use crate::service::AppService;
use std::io;
use std::sync::mpsc::{self, Receiver};
use std::thread;
use tracing::{debug, error, info, warn};

/// Runs one business context over length-prefixed stdio until native closes
/// stdin.
pub fn run(routes: RouteTable) -> Result<(), Box<dyn std::error::Error>> {
    let config = HostConfig::from_env();
    info!(
        sid = config.sid.as_str(),
        outbound_queue_cap = config.outbound_queue_cap,
        "starting applet host"
    );

    let (outbound_tx, outbound_rx) = mpsc::sync_channel::<Vec<u8>>(config.outbound_queue_cap);
    let (inbound_tx, inbound_rx) = mpsc::channel::<NativeEnvelope>();

    let outbound_frame_cap = config.outbound_frame_cap;
    let writer_handle = thread::spawn(move || {
        let stdout = io::stdout();
        writer_loop(outbound_rx, stdout.lock(), outbound_frame_cap)
    });

    let inbound_frame_cap = config.inbound_frame_cap;
    let reader_handle = thread::spawn(move || {
        let stdin = io::stdin();
        let read_result = reader_loop(stdin.lock(), inbound_frame_cap, |envelope: NativeEnvelope| {
            if inbound_tx.send(envelope).is_err() {
                debug!("service loop gone; inbound envelope dropped");
            }
        });

        if let Err(err) = &read_result {
            error!("reader loop terminated with error: {err}");
        }

        read_result
    });

    let mut app = AppService::new(
        ChannelTransport::new(
            outbound_tx,
            config.outbound_queue_cap,
            config.outbound_frame_cap,
        ),
        routes,
    );
    app.ready(config.sid.clone())?;

    let handled = service_loop(&mut app, &inbound_rx);
    info!(handled, "service loop finished");

    // Dropping the service releases the outbound sender so the writer drains and ends.
    drop(app);

    if reader_handle.is_finished() {
        match reader_handle.join() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!("reader thread returned error: {err}"),
            Err(err) => warn!("reader thread join failed: {err:?}"),
        }
    } else {
        warn!("reader thread still active during shutdown; skipping join");
    }

    match writer_handle.join() {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!("writer thread returned error: {err}"),
        Err(err) => warn!("writer thread join failed: {err:?}"),
    }

    Ok(())
}

/// Handles inbound envelopes in batches: everything already queued is
/// handled, then one tick flushes the resulting patches. Ends when the
/// inbound side disconnects or the outbound channel closes.
pub fn service_loop(app: &mut AppService, inbound: &Receiver<NativeEnvelope>) -> usize {
    let mut handled = 0;

    while let Ok(envelope) = inbound.recv() {
        app.handle_envelope(envelope);
        handled += 1;

        while let Ok(envelope) = inbound.try_recv() {
            app.handle_envelope(envelope);
            handled += 1;
        }

        if !flush_tick(app) {
            break;
        }
    }

    handled
}

/// Runs one tick. False once the outbound channel is gone; a single message
/// that could not be framed only loses that message.
fn flush_tick(app: &mut AppService) -> bool {
    match app.run_tick() {
        Ok(_) => true,
        Err(BridgeError::ChannelClosed) => {
            error!("outbound channel closed; stopping service loop");
            false
        }
        Err(err) => {
            error!("tick flush dropped a message: {err}");
            true
        }
    }
}
