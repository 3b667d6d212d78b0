// src/stream/notices.rs
//
// User-visible problems (dropped connection, bad metadata, failed request)
// queued for whatever shows them. Bounded: the oldest notice goes first.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NoticeKind {
    Transport,
    MalformedMetadata,
    ServerError,
    FrameDecode,
    Request,
}

impl fmt::Display for NoticeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NoticeKind::Transport => "transport",
            NoticeKind::MalformedMetadata => "malformed-metadata",
            NoticeKind::ServerError => "server-error",
            NoticeKind::FrameDecode => "frame-decode",
            NoticeKind::Request => "request",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
    pub at: DateTime<Utc>,
}

pub struct NoticeBoard {
    notices: VecDeque<Notice>,
    max_pending: usize,
}

impl NoticeBoard {
    pub fn new(max_pending: usize) -> Self {
        let max_pending = max_pending.max(1);
        Self {
            notices: VecDeque::with_capacity(max_pending),
            max_pending,
        }
    }

    pub fn publish(&mut self, kind: NoticeKind, message: impl Into<String>) {
        if self.notices.len() >= self.max_pending {
            warn!(
                "Notice board full ({} notices), dropping oldest",
                self.max_pending
            );
            self.notices.pop_front();
        }
        self.notices.push_back(Notice {
            kind,
            message: message.into(),
            at: Utc::now(),
        });
    }

    pub fn drain(&mut self) -> Vec<Notice> {
        self.notices.drain(..).collect()
    }

}

#[cfg(test)]
impl NoticeBoard {
    pub fn latest(&self) -> Option<&Notice> {
        self.notices.back()
    }

    pub fn pending_count(&self) -> usize {
        self.notices.len()
    }
}
