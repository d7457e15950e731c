use std::io::Write;

/// Operator-facing notices raised while an import walks its document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportEvent<'a> {
    Chapter { label: &'a str },
    Progress { processed: u64 },
}

pub trait ImportObserver {
    fn on_event(&mut self, event: &ImportEvent<'_>);
}

impl ImportObserver for () {
    fn on_event(&mut self, _event: &ImportEvent<'_>) {}
}

impl<T: ImportObserver + ?Sized> ImportObserver for &mut T {
    fn on_event(&mut self, event: &ImportEvent<'_>) {
        (**self).on_event(event)
    }
}

impl<T: ImportObserver> ImportObserver for Option<T> {
    fn on_event(&mut self, event: &ImportEvent<'_>) {
        if let Some(inner) = self {
            inner.on_event(event);
        }
    }
}

impl<A: ImportObserver, B: ImportObserver> ImportObserver for (A, B) {
    fn on_event(&mut self, event: &ImportEvent<'_>) {
        self.0.on_event(event);
        self.1.on_event(event);
    }
}

/// Writes notices as plain text lines.
pub struct ProgressPrinter<W: Write> {
    out: W,
}

impl<W: Write> ProgressPrinter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ImportObserver for ProgressPrinter<W> {
    fn on_event(&mut self, event: &ImportEvent<'_>) {
        // Progress output is best effort; a closed pipe must not fail the run.
        let _ = match event {
            ImportEvent::Chapter { label } => writeln!(self.out, "Processing: {label}"),
            ImportEvent::Progress { processed } => {
                writeln!(self.out, "  Processed {processed} records...")
            }
        };
        let _ = self.out.flush();
    }
}
