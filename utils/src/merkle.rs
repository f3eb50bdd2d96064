//! Binary merkle root over an ordered list of digests.
//!
//! The tree splits left-heavy: a list of `n` leaves puts the first
//! `(n + 1) / 2` under the left child. An empty list hashes the empty byte
//! string, a single leaf is its own root.

use std::borrow::Cow;
use std::io::Write;

use hash::{HashOutput, Hasher};

pub fn compute_root_from_hashes<T: HashOutput>(values: &[T]) -> T {
    compute_root_from_slice(values).into_owned()
}

fn compute_root_from_slice<T: HashOutput>(values: &[T]) -> Cow<T> {
    let mut hasher = T::Builder::default();
    match values.len() {
        0 => {
            hasher.write(&[]).unwrap();
        }
        1 => {
            return Cow::Borrowed(&values[0]);
        }
        len => {
            let mid = (len + 1) / 2;
            let left = compute_root_from_slice(&values[..mid]);
            let right = compute_root_from_slice(&values[mid..]);
            hasher.hash(&*left);
            hasher.hash(&*right);
        }
    }
    Cow::Owned(hasher.finish())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use hash::{Hash, Sha256Hash, Sha256Hasher};

    use super::*;

    fn leaf(data: &[u8]) -> Sha256Hash {
        data.to_vec().hash()
    }

    fn branch(left: &Sha256Hash, right: &Sha256Hash) -> Sha256Hash {
        let mut h = Sha256Hasher::new();
        h.hash(left);
        h.hash(right);
        h.finish()
    }

    #[test]
    fn it_hashes_the_empty_list() {
        let root = compute_root_from_hashes::<Sha256Hash>(&[]);
        let mut h = Sha256Hasher::new();
        h.write_all(&[]).unwrap();
        assert_eq!(root, h.finish());
    }

    #[test]
    fn it_passes_a_single_leaf_through() {
        let a = leaf(b"a");
        assert_eq!(compute_root_from_hashes(&[a]), a);
    }

    #[test]
    fn it_combines_pairs_left_to_right() {
        let a = leaf(b"a");
        let b = leaf(b"b");
        let c = leaf(b"c");

        assert_eq!(compute_root_from_hashes(&[a, b]), branch(&a, &b));
        // Three leaves: ((a, b), c).
        assert_eq!(
            compute_root_from_hashes(&[a, b, c]),
            branch(&branch(&a, &b), &c)
        );
    }

    #[test]
    fn it_depends_on_leaf_order() {
        let a = leaf(b"a");
        let b = leaf(b"b");
        assert_ne!(
            compute_root_from_hashes(&[a, b]),
            compute_root_from_hashes(&[b, a])
        );
    }
}
