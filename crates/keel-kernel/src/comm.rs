//! Synchronous rendezvous channel: capacity-1 exchange of 32-bit words.
//! Each `speak` pairs with exactly one `listen`, and neither returns
//! until the pair has met.

use crate::sync::{Condition, Mutex};
use crate::Kernel;

/// Mailbox state: at most one unconsumed word at a time.
struct Channel {
    word: u32,
    full: bool,
    /// Speakers blocked because the mailbox was full.
    speakers: usize,
    /// Listeners blocked because the mailbox was empty.
    listeners: usize,
}

pub struct Communicator {
    state: Mutex<Channel>,
    speaker: Condition,
    listener: Condition,
    /// Signalled once per consumed word, releasing its depositor.
    handshake: Condition,
}

impl Communicator {
    pub fn new(kernel: &Kernel) -> Self {
        let state = Mutex::new(
            kernel,
            Channel {
                word: 0,
                full: false,
                speakers: 0,
                listeners: 0,
            },
        );
        let speaker = Condition::new(&state);
        let listener = Condition::new(&state);
        let handshake = Condition::new(&state);
        Self {
            state,
            speaker,
            listener,
            handshake,
        }
    }

    /// Deposit `word` for exactly one listener. Blocks while an earlier
    /// word is still unconsumed, then again until this word is taken; the
    /// call never returns before some listener has captured it.
    pub fn speak(&self, word: u32) {
        let mut channel = self.state.lock();
        while channel.full {
            channel.speakers += 1;
            channel = self.speaker.wait(channel);
        }
        channel.word = word;
        channel.full = true;
        if channel.listeners > 0 {
            self.listener.notify_one();
            channel.listeners -= 1;
        }
        // only the depositing speaker ever sleeps here, so one signal from
        // the consuming listener is enough
        let channel = self.handshake.wait(channel);
        drop(channel);
    }

    /// Take the next spoken word, blocking until a speaker provides one.
    pub fn listen(&self) -> u32 {
        let mut channel = self.state.lock();
        while !channel.full {
            channel.listeners += 1;
            channel = self.listener.wait(channel);
        }
        let word = channel.word;
        channel.full = false;
        if channel.speakers > 0 {
            self.speaker.notify_one();
            channel.speakers -= 1;
        }
        self.handshake.notify_one();
        drop(channel);
        word
    }
}
