// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use opentelemetry::{
    Context, KeyValue,
    trace::{Status, TraceContextExt},
};
use opentelemetry_semantic_conventions::{
    attribute::HTTP_RESPONSE_BODY_SIZE, trace::HTTP_RESPONSE_STATUS_CODE,
};
use traceware_http::ResponseWriter;

use crate::{ResponseObserver, ResponseOutcome};

/// Owns the request span, and ends it when dropped with what was observed of
/// the response so far.
pub(super) struct SpanGuard {
    cx: Context,
    outcome: ResponseOutcome,
    panicked: bool,
}

impl SpanGuard {
    pub(super) fn new(cx: Context) -> Self {
        Self {
            cx,
            outcome: ResponseOutcome::new(),
            panicked: false,
        }
    }

    pub(super) fn context(&self) -> &Context {
        &self.cx
    }

    pub(super) fn observe<'a>(
        &'a mut self,
        writer: &'a mut dyn ResponseWriter,
    ) -> ResponseObserver<'a> {
        ResponseObserver::new(writer, &mut self.outcome)
    }

    pub(super) fn mark_panicked(&mut self) {
        self.panicked = true;
    }
}

impl Drop for SpanGuard {
    fn drop(&mut self) {
        let span = self.cx.span();
        let status = self.outcome.status();

        if self.panicked {
            span.set_status(Status::error("handler panicked"));
        } else if status.as_u16() >= 400 {
            span.set_status(Status::error(format!("HTTP {}", status.as_u16())));
        } else {
            span.set_status(Status::Ok);
        }

        span.set_attribute(KeyValue::new(
            HTTP_RESPONSE_STATUS_CODE,
            i64::from(status.as_u16()),
        ));
        span.set_attribute(KeyValue::new(
            HTTP_RESPONSE_BODY_SIZE,
            i64::try_from(self.outcome.bytes_written()).unwrap_or(i64::MAX),
        ));
        span.end();
    }
}
