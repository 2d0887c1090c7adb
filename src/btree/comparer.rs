//! Total orders over tree items

use std::cmp::Ordering;

/// Total order used to place items in a tree
///
/// Items comparing `Equal` are duplicates: the tree keeps all of them.
pub trait Comparer<T> {
    fn compare(&self, a: &T, b: &T) -> Ordering;
}

/// `Ord`-based ordering
#[derive(Debug, Clone, Copy, Default)]
pub struct NaturalOrder;

impl<T: Ord> Comparer<T> for NaturalOrder {
    #[inline]
    fn compare(&self, a: &T, b: &T) -> Ordering {
        a.cmp(b)
    }
}

impl<T, F> Comparer<T> for F
where
    F: Fn(&T, &T) -> Ordering,
{
    #[inline]
    fn compare(&self, a: &T, b: &T) -> Ordering {
        self(a, b)
    }
}

/// Reverses another comparer
#[derive(Debug, Clone, Copy, Default)]
pub struct Reverse<C>(pub C);

impl<T, C: Comparer<T>> Comparer<T> for Reverse<C> {
    #[inline]
    fn compare(&self, a: &T, b: &T) -> Ordering {
        self.0.compare(b, a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_natural_order() {
        assert_eq!(NaturalOrder.compare(&1, &2), Ordering::Less);
        assert_eq!(NaturalOrder.compare(&"b", &"a"), Ordering::Greater);
    }

    #[test]
    fn test_closure_comparer() {
        let by_total = |a: &f64, b: &f64| a.total_cmp(b);
        assert_eq!(by_total.compare(&-0.0, &0.0), Ordering::Less);
    }

    #[test]
    fn test_reverse() {
        assert_eq!(Reverse(NaturalOrder).compare(&1, &2), Ordering::Greater);
    }
}
