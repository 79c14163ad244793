use super::{Event, Value};

/// A result produced by query evaluation, linked to the next result of the
/// same evaluation step.
///
/// Only `output_data` is visible downstream; the chain is walked head first.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StreamEvent {
    pub timestamp: i64,
    pub output_data: Vec<Value>,
    pub next: Option<Box<StreamEvent>>,
}

impl StreamEvent {
    pub fn new(timestamp: i64, output_data: Vec<Value>) -> Self {
        Self {
            timestamp,
            output_data,
            next: None,
        }
    }

    /// Build a chain from events in order. Returns `None` for an empty input.
    pub fn chain<I>(events: I) -> Option<Self>
    where
        I: IntoIterator<Item = StreamEvent>,
        I::IntoIter: DoubleEndedIterator,
    {
        events.into_iter().rev().fold(None, |next, mut event| {
            event.next = next.map(Box::new);
            Some(event)
        })
    }

    /// Append `event` at the end of this chain.
    pub fn append(&mut self, event: StreamEvent) {
        let mut tail = self;
        loop {
            match tail.next {
                Some(ref mut link) => tail = link,
                None => {
                    tail.next = Some(Box::new(event));
                    return;
                }
            }
        }
    }

    pub fn iter(&self) -> StreamEventIter<'_> {
        StreamEventIter {
            current: Some(self),
        }
    }

    /// Copy this link (not the rest of the chain) into a standalone event.
    pub fn to_event(&self) -> Event {
        Event::new(self.timestamp, self.output_data.clone())
    }
}

/// Iterator over a [`StreamEvent`] chain in link order.
pub struct StreamEventIter<'a> {
    current: Option<&'a StreamEvent>,
}

impl<'a> Iterator for StreamEventIter<'a> {
    type Item = &'a StreamEvent;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.current?;
        self.current = current.next.as_deref();
        Some(current)
    }
}

impl<'a> IntoIterator for &'a StreamEvent {
    type Item = &'a StreamEvent;
    type IntoIter = StreamEventIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
