//! Opening and closing the connection.
//!
//! Every wait is bounded by [TcpConfig::ack_timeout]. An elapsed wait is
//! answered by retransmitting exactly once; a second elapsed wait gives up.

use tracing::{error, info, warn};

use super::fsm::{ConnectionState, Tcb};
use super::{Channel, Segment};
use crate::config::TcpConfig;
use crate::error::Abort;
use crate::link::DatagramLink;
use crate::{Error, Result};

/// Number of times a `SYN` or `FIN` is transmitted before giving up.
const MAX_TRANSMISSIONS: usize = 2;

/// Performs the three-way handshake.
///
/// On success the connection is `ESTABLISHED`, `tcb.seq` is `ISS + 1` and
/// `tcb.ack` is the peer's initial sequence number plus one.
///
/// # Errors
///
/// Returns [Abort::Handshake] if neither the `SYN` nor its retransmission is
/// answered with a matching `SYN_ACK`.
pub fn open<L: DatagramLink>(
    tcb: &mut Tcb,
    chan: &mut Channel<L>,
    config: &TcpConfig,
) -> Result<()> {
    // <SEQ=ISS><CTL=SYN>
    let syn = Segment::syn(&tcb.sock, tcb.iss, config.rcv_wnd, config.mss);
    let expected_ack = tcb.iss.wrapping_add(1);

    tcb.transition(ConnectionState::SYN_SENT, "sending SYN");

    for attempt in 0..MAX_TRANSMISSIONS {
        if attempt > 0 {
            warn!(
                "[{}] (SYN_SENT) no SYN_ACK within {:?}, retransmitting SYN",
                tcb.sock, config.ack_timeout
            );
        }

        chan.transmit(&syn)?;

        let reply = chan.await_segment(tcb, config.ack_timeout, |seg| {
            seg.tcp.syn() && seg.tcp.ack() && seg.ack_number() == expected_ack
        })?;

        let Some(syn_ack) = reply else {
            continue;
        };

        tcb.irs = syn_ack.seq_number();
        tcb.seq = expected_ack;
        tcb.ack = tcb.irs.wrapping_add(1);

        // An MSS of zero would stall every send.
        if let Some(peer_mss) = syn_ack.tcp.mss().filter(|&mss| mss > 0) {
            tcb.mss = tcb.mss.min(peer_mss);
        }

        // <SEQ=ISS+1><ACK=IRS+1><CTL=ACK>
        chan.transmit(&Segment::ack(&tcb.sock, tcb.seq, tcb.ack, config.rcv_wnd))?;

        tcb.transition(
            ConnectionState::ESTABLISHED,
            "received SYN_ACK, sent ACK",
        );

        info!(
            "[{}] connection established (mss: {}, peer window: {})",
            tcb.sock, tcb.mss, tcb.awnd
        );

        return Ok(());
    }

    error!(
        "[{}] (SYN_SENT) SYN retransmission unanswered, giving up",
        tcb.sock
    );

    tcb.transition(ConnectionState::CLOSED, "handshake timed out");

    Err(Error::Aborted(Abort::Handshake))
}

/// Tears the connection down from our side.
///
/// Returns `true` if the connection is closed, either because the peer closed
/// it first or because our `FIN` was answered by a `FIN_ACK`. Returns `false`
/// if neither the `FIN` nor its retransmission was answered; the connection
/// is still considered closed locally.
pub fn close<L: DatagramLink>(
    tcb: &mut Tcb,
    chan: &mut Channel<L>,
    config: &TcpConfig,
) -> Result<bool> {
    match tcb.state {
        ConnectionState::CLOSED => return Ok(true),
        ConnectionState::INIT | ConnectionState::CLOSE_WAIT => {
            tcb.transition(ConnectionState::CLOSED, "close without FIN");
            return Ok(true);
        }
        ConnectionState::SYN_SENT | ConnectionState::ESTABLISHED | ConnectionState::FIN_SENT => {}
    }

    // <SEQ=SND.NXT><ACK=RCV.NXT><CTL=FIN,ACK>
    let fin = Segment::fin_ack(&tcb.sock, tcb.seq, tcb.ack, config.rcv_wnd);
    let expected_ack = tcb.seq.wrapping_add(1);

    tcb.transition(ConnectionState::FIN_SENT, "sending FIN");

    for attempt in 0..MAX_TRANSMISSIONS {
        if attempt > 0 {
            warn!(
                "[{}] (FIN_SENT) no FIN_ACK within {:?}, retransmitting FIN",
                tcb.sock, config.ack_timeout
            );
        }

        chan.transmit(&fin)?;

        let reply = chan.await_segment(tcb, config.ack_timeout, |seg| {
            seg.tcp.fin() && seg.tcp.ack() && seg.ack_number() == expected_ack
        })?;

        let Some(fin_ack) = reply else {
            continue;
        };

        tcb.seq = expected_ack;
        tcb.ack = fin_ack.seq_number().wrapping_add(1);

        // The final ACK goes out whether or not the FIN had to be resent.
        chan.transmit(&Segment::ack(&tcb.sock, tcb.seq, tcb.ack, config.rcv_wnd))?;

        tcb.transition(ConnectionState::CLOSED, "received FIN_ACK, sent ACK");

        return Ok(true);
    }

    warn!(
        "[{}] (FIN_SENT) FIN retransmission unanswered, closing anyway",
        tcb.sock
    );

    tcb.transition(ConnectionState::CLOSED, "teardown timed out");

    Ok(false)
}
