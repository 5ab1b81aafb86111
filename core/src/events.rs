//! One-shot event queue polled from the main loop.
//!
//! Suspension points return control to the loop and resume via a typed
//! event; there is no preemption and no re-entry into flow code from event
//! handlers. Every wait returns one of `{event, timeout, aborted}` and
//! flows must tolerate all three at every suspension point.

use std::collections::VecDeque;

use x1_host::Interface;

/// Events delivered by the UI task and the host listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A raw frame arrived on a host interface.
    HostFrame { interface: Interface, bytes: Vec<u8> },
    /// An NFC card answered the poll.
    CardPresented,
    /// User pressed confirm (true) or back/reject (false).
    UserButton(bool),
    /// Periodic tick used for timeout accounting.
    Tick,
}

/// Outcome of a suspension point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitResult<T> {
    Event(T),
    Timeout,
    Aborted,
}

/// FIFO of pending events with an abort latch.
#[derive(Debug, Default)]
pub struct EventQueue {
    queue: VecDeque<Event>,
    aborted: bool,
}

impl EventQueue {
    pub fn new() -> EventQueue {
        EventQueue::default()
    }

    pub fn push(&mut self, event: Event) {
        self.queue.push_back(event);
    }

    /// Marks the in-flight flow aborted; drains at the next wait.
    pub fn abort(&mut self) {
        self.aborted = true;
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Pops the next event, surfacing a pending abort first.
    pub fn next(&mut self) -> WaitResult<Event> {
        if self.aborted {
            self.aborted = false;
            self.queue.clear();
            return WaitResult::Aborted;
        }
        match self.queue.pop_front() {
            Some(event) => WaitResult::Event(event),
            None => WaitResult::Timeout,
        }
    }

    /// Waits for a card tap, consuming unrelated events up to `budget`.
    pub fn await_card_tap(&mut self, budget: usize) -> WaitResult<()> {
        self.await_matching(budget, |event| matches!(event, Event::CardPresented).then_some(()))
    }

    /// Waits for a user decision.
    pub fn await_user_confirm(&mut self, budget: usize) -> WaitResult<bool> {
        self.await_matching(budget, |event| match event {
            Event::UserButton(approved) => Some(*approved),
            _ => None,
        })
    }

    /// Waits for the next host frame.
    pub fn await_host_frame(&mut self, budget: usize) -> WaitResult<(Interface, Vec<u8>)> {
        self.await_matching(budget, |event| match event {
            Event::HostFrame { interface, bytes } => Some((*interface, bytes.clone())),
            _ => None,
        })
    }

    fn await_matching<T>(
        &mut self,
        budget: usize,
        mut matcher: impl FnMut(&Event) -> Option<T>,
    ) -> WaitResult<T> {
        for _ in 0..=budget {
            match self.next() {
                WaitResult::Event(event) => {
                    if let Some(value) = matcher(&event) {
                        return WaitResult::Event(value);
                    }
                }
                WaitResult::Timeout => return WaitResult::Timeout,
                WaitResult::Aborted => return WaitResult::Aborted,
            }
        }
        WaitResult::Timeout
    }
}
