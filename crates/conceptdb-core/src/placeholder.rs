//! Placeholder encoding for logically empty arrays.
//!
//! The store cannot infer an element type from an empty array, so an empty
//! list is written as a single placeholder element and read back as empty.
//! Only a singleton placeholder means "empty"; longer arrays are untouched.
//! A real one-element list holding the placeholder (`[0]`, `[0.0]`, `[""]`)
//! is therefore indistinguishable from an empty one and reads back empty.

/// Element types that have a placeholder value.
pub trait Placeholder: Sized {
    fn placeholder() -> Self;
    fn is_placeholder(&self) -> bool;
}

impl Placeholder for i64 {
    fn placeholder() -> Self {
        0
    }
    fn is_placeholder(&self) -> bool {
        *self == 0
    }
}

impl Placeholder for u32 {
    fn placeholder() -> Self {
        0
    }
    fn is_placeholder(&self) -> bool {
        *self == 0
    }
}

impl Placeholder for String {
    fn placeholder() -> Self {
        String::new()
    }
    fn is_placeholder(&self) -> bool {
        self.is_empty()
    }
}

impl Placeholder for f32 {
    fn placeholder() -> Self {
        0.0
    }
    fn is_placeholder(&self) -> bool {
        *self == 0.0
    }
}

/// Encode a list for storage. Empty becomes `[placeholder]`.
pub fn encode_list<T: Placeholder + Clone>(items: &[T]) -> Vec<T> {
    if items.is_empty() {
        vec![T::placeholder()]
    } else {
        items.to_vec()
    }
}

/// Decode a stored list. `[placeholder]` becomes empty.
pub fn strip_placeholder<T: Placeholder>(items: Vec<T>) -> Vec<T> {
    if items.len() == 1 && items[0].is_placeholder() {
        Vec::new()
    } else {
        items
    }
}
