use serde_json::{Map, Value};

/// One record produced by a page fetch, keyed by column name. Keys may be
/// bare (`email`), model-qualified (`EmailSignup.email`), or a nested
/// per-model map (`{"EmailSignup": {"email": ...}}`); projection handles
/// all three shapes.
pub type Row = Map<String, Value>;

/// One bounded batch of rows fetched and rendered together. At most
/// `limit` rows; empty only on an empty first page or to signal
/// termination.
pub type Chunk = Vec<Row>;
