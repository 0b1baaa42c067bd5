//! Dispatch intake pipeline.
//!
//! Every fetched message flows through:
//! 1. `normalize()`: MIME parse into subject, sender, date and bodies
//! 2. `sanitize()`: strip quoted-printable residue and markup
//! 3. `FieldExtractor::extract()`: ordered rule table into a `WorkOrderDraft`
//! 4. `aggregate_batch()`: review flags, duplicate suppression, hand-off to a `DraftSink`
//!
//! Nothing here writes back to the source system. Drafts are proposals for a
//! person to confirm.

pub mod aggregator;
pub mod extractor;
pub mod normalize;
pub mod processor;
pub mod rules;
pub mod sanitize;
pub mod types;
