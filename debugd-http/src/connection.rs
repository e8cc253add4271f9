use crate::handler::{DebugService, RESP_400, build_response, build_response_head};
use crate::request::{MAX_DRAIN_BODY_BYTES, RequestHead, parse_head};
use monoio::io::{AsyncReadRent, AsyncWriteRentExt};
use monoio::net::TcpStream;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info};

const READ_CHUNK: usize = 8192;

/// Outcome of filling the read buffer up to a complete request.
enum ReadOutcome {
    Head(RequestHead),
    /// Peer closed cleanly between requests.
    Closed,
    /// Malformed, oversized, or truncated head.
    Rejected,
}

/// Handle a single client connection (HTTP/1.1 with keepalive).
///
/// Every parsed request is recorded and answered by the shared
/// [`DebugService`] as soon as its head is in. Any request body is read and
/// discarded afterwards; the connection then either waits for the next
/// request or closes, depending on what the client asked for.
pub async fn handle_connection(
    mut client: TcpStream,
    peer_addr: SocketAddr,
    service: Arc<DebugService>,
) -> anyhow::Result<()> {
    // ── Buffers allocated ONCE, reused across keepalive requests ──
    let mut read_buf = vec![0u8; READ_CHUNK];
    let mut pending: Vec<u8> = Vec::with_capacity(READ_CHUNK);
    let mut resp_buf = Vec::with_capacity(4096);

    loop {
        let head = match read_head(&mut client, &mut read_buf, &mut pending).await? {
            ReadOutcome::Head(head) => head,
            ReadOutcome::Closed => return Ok(()),
            ReadOutcome::Rejected => {
                let (res, _) = client.write_all(RESP_400.to_vec()).await;
                res?;
                return Ok(());
            }
        };

        let mut keep_alive = head.wants_keep_alive();
        let needed = head.head_len + head.content_length();
        // A client waiting on 100-continue never sends the body after a final status.
        let drainable = !head.is_chunked()
            && head.content_length() <= MAX_DRAIN_BODY_BYTES
            && !(head.expects_continue() && pending.len() < needed);
        if !drainable {
            keep_alive = false;
        }

        // ── Dispatch as soon as the head is in (no await while the handler runs) ──
        let result = {
            let headers = head.header_refs();
            service.handle_request(&head.method, &head.path, &headers, peer_addr)
        };
        let status = result.status;

        if head.method == "HEAD" {
            build_response_head(&mut resp_buf, status, &result.headers, result.body.len(), keep_alive);
        } else {
            build_response(&mut resp_buf, status, &result.headers, &result.body, keep_alive);
        }
        let (res, returned) = client.write_all(resp_buf).await;
        resp_buf = returned;

        info!(
            method = %head.method,
            path = %head.path,
            client = %peer_addr,
            status,
            "request"
        );
        res?;

        if !drainable {
            return Ok(());
        }

        // ── Consume the body so the next request starts on a clean buffer ──
        while pending.len() < needed {
            let (res, returned) = client.read(read_buf).await;
            read_buf = returned;
            match res? {
                0 => return Ok(()),
                n => pending.extend_from_slice(&read_buf[..n]),
            }
        }
        pending.drain(..needed);

        if !keep_alive {
            return Ok(());
        }
    }
}

/// Read until `pending` starts with a complete request head.
async fn read_head(
    client: &mut TcpStream,
    read_buf: &mut Vec<u8>,
    pending: &mut Vec<u8>,
) -> anyhow::Result<ReadOutcome> {
    loop {
        if !pending.is_empty() {
            match parse_head(pending) {
                Ok(Some(head)) => return Ok(ReadOutcome::Head(head)),
                Ok(None) => {}
                Err(e) => {
                    debug!(error = %e, "HTTP parse error");
                    return Ok(ReadOutcome::Rejected);
                }
            }
        }

        let buf = std::mem::take(read_buf);
        let (res, returned) = client.read(buf).await;
        *read_buf = returned;
        match res? {
            0 if pending.is_empty() => return Ok(ReadOutcome::Closed),
            0 => {
                debug!(buffered = pending.len(), "Connection closed mid-request");
                return Ok(ReadOutcome::Rejected);
            }
            n => pending.extend_from_slice(&read_buf[..n]),
        }
    }
}
