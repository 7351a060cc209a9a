//! Multiplexes chat and portrait data into echo frames.
//!
//! Every echo frame carries up to four payload bytes. When a frame is about
//! to be sent the multiplexer fills it by priority:
//!
//! 1. pending chat keystrokes,
//! 2. the next portrait runs, while the local portrait is still being sent,
//! 3. nothing (a keep-alive dummy).
//!
//! Bytes leave the outgoing queues when the frame is built, not when it is
//! acknowledged. A lost frame is resent verbatim by the sequence engine, so
//! each byte is still delivered exactly once.

use parley_protocol::{EchoFrame, EchoKind};

use crate::chat::ChatLine;
use crate::portrait::{Portrait, PortraitRun, RunCursor};
use crate::stream::ByteRing;
use crate::SessionError;

/// Whose chat line or portrait something refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Mine,
    Opponent,
}

/// Something the UI may want to redraw after a frame was consumed.
#[derive(Debug)]
pub enum StreamEvent {
    PortraitRun { run: PortraitRun, at: RunCursor },
    /// A portrait run could not be applied.
    Desync(SessionError),
}

/// Chat rings, visible lines, and portrait cursors for both directions.
#[derive(Debug)]
pub struct StreamMultiplexer {
    outgoing_chat: ByteRing,
    incoming_chat: ByteRing,
    my_line: ChatLine,
    opponent_line: ChatLine,
    local_portrait: Option<Portrait>,
    outgoing_cursor: RunCursor,
    remote_portrait: Portrait,
    incoming_cursor: RunCursor,
}

impl StreamMultiplexer {
    pub fn new(stream_capacity: usize, visible_chat_limit: usize) -> Self {
        Self {
            outgoing_chat: ByteRing::new(stream_capacity),
            incoming_chat: ByteRing::new(stream_capacity),
            my_line: ChatLine::new(visible_chat_limit),
            opponent_line: ChatLine::new(visible_chat_limit),
            local_portrait: None,
            outgoing_cursor: RunCursor::default(),
            remote_portrait: Portrait::blank(),
            incoming_cursor: RunCursor::default(),
        }
    }

    /// Records a local keystroke: shown immediately, queued for sending.
    /// Zero bytes are dropped since zero terminates a frame's payload.
    pub fn type_key(&mut self, key: u8) {
        if key == 0 {
            return;
        }
        self.my_line.apply(key);
        self.outgoing_chat.push(key);
    }

    /// Starts (or restarts) sending the local portrait from its first row.
    pub fn set_local_portrait(&mut self, portrait: Portrait) {
        self.local_portrait = Some(portrait);
        self.outgoing_cursor = RunCursor::default();
    }

    /// Builds the payload of the next outgoing frame.
    pub fn next_payload(&mut self) -> (EchoKind, [u8; 4]) {
        if !self.outgoing_chat.is_empty() {
            return (EchoKind::Chat, self.outgoing_chat.take_chunk::<4>());
        }

        if let Some(portrait) = &self.local_portrait {
            let mut data = [0u8; 4];
            let mut filled = 0;
            while filled < data.len() {
                match portrait.next_run(&mut self.outgoing_cursor) {
                    Some(run) => {
                        data[filled] = run.pack();
                        filled += 1;
                    }
                    None => break,
                }
            }
            if filled > 0 {
                return (EchoKind::Portrait, data);
            }
        }

        (EchoKind::Dummy, [0; 4])
    }

    /// Consumes the payload of a matched frame from the peer.
    pub fn accept(&mut self, frame: &EchoFrame) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        match frame.kind {
            EchoKind::Dummy => {}
            EchoKind::Chat => {
                for &key in frame.payload() {
                    self.incoming_chat.push(key);
                }
            }
            EchoKind::Portrait => {
                for &packed in frame.payload() {
                    let run = PortraitRun::unpack(packed);
                    let at = self.incoming_cursor;
                    match self
                        .remote_portrait
                        .apply_run(&mut self.incoming_cursor, run)
                    {
                        Ok(()) => events.push(StreamEvent::PortraitRun { run, at }),
                        Err(e) => events.push(StreamEvent::Desync(e)),
                    }
                }
            }
        }
        events
    }

    /// Moves received keystrokes into the opponent's visible line. Returns
    /// true if the line changed.
    pub fn drain_incoming_chat(&mut self) -> bool {
        let mut changed = false;
        while let Some(key) = self.incoming_chat.pop() {
            self.opponent_line.apply(key);
            changed = true;
        }
        changed
    }

    pub fn chat_line(&self, side: Side) -> &ChatLine {
        match side {
            Side::Mine => &self.my_line,
            Side::Opponent => &self.opponent_line,
        }
    }

    pub fn remote_portrait(&self) -> &Portrait {
        &self.remote_portrait
    }

    pub fn remote_portrait_complete(&self) -> bool {
        self.incoming_cursor.is_complete()
    }

    pub fn local_portrait_sent(&self) -> bool {
        self.local_portrait.is_none() || self.outgoing_cursor.is_complete()
    }

    pub fn has_pending_chat(&self) -> bool {
        !self.outgoing_chat.is_empty()
    }
}
