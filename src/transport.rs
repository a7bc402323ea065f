//! Ingress/egress transport boundary: trait definitions only, the transport
//! itself (UDP multicast, WebRTC, whatever) is out of scope per spec.md §1.
//!
//! Grounded in the teacher's `party::network::NetworkNode` `Sink`/`Source`
//! orchestration shape, reduced here to the two narrow contracts spec.md §6
//! actually requires: a non-blocking stream of ingress packets and a
//! fallible per-frame egress call.

use crate::error::CoreResult;
use crate::types::RtpFrame;

/// One packet as it arrives from the transport, before the core stamps it
/// with a monotonic arrival instant and wraps it as an [`RtpFrame`].
#[derive(Debug, Clone)]
pub struct IngressPacket {
    pub stream_id: u32,
    pub sequence: u16,
    pub rtp_timestamp: u32,
    pub payload: Vec<u8>,
}

impl IngressPacket {
    /// Stamps arrival time and converts to the core's internal [`RtpFrame`].
    pub fn into_rtp_frame(self) -> RtpFrame {
        RtpFrame::new(
            self.stream_id.into(),
            self.sequence,
            self.rtp_timestamp,
            self.payload,
        )
    }
}

/// Non-blocking source of ingress packets. Closing the stream (returning
/// `None`) ends the session.
///
/// The core polls this; it never owns the underlying socket/runtime.
pub trait IngressSource: Send {
    /// Returns the next available packet without blocking, or `None` if the
    /// stream has ended.
    async fn try_recv(&mut self) -> Option<IngressPacket>;
}

/// Sink for compressed egress frames. Called exactly once per 20 ms while
/// audio is being played back (spec.md §6). An error aborts only the current
/// playback chunk, not the session.
pub trait EgressSink: Send {
    async fn send_frame(&mut self, compressed: &[u8]) -> CoreResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StreamId;

    #[test]
    fn ingress_packet_converts_to_rtp_frame_preserving_fields() {
        let packet = IngressPacket {
            stream_id: 42,
            sequence: 7,
            rtp_timestamp: 1920,
            payload: vec![1, 2, 3],
        };
        let frame = packet.into_rtp_frame();
        assert_eq!(frame.stream, StreamId(42));
        assert_eq!(frame.seq, 7);
        assert_eq!(frame.rtp_ts, 1920);
        assert_eq!(&frame.payload[..], &[1, 2, 3]);
    }
}
