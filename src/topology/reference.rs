//! Reference hypercube sub-entity tables.
//!
//! A sub-entity of the unit cell `[0,1]^D` is encoded by an offset vector in
//! `{0,1,2}^D` on the doubled lattice: `0`/`2` pin a coordinate to the lower or
//! upper face, `1` marks a direction the entity extends along. The entity's
//! dimension is the number of `1` entries.

/// Offsets of all sub-entities of dimension `dim`, lexicographic with axis 0 fastest.
///
/// For `dim == 0` the order matches child-index order of
/// [`TreeCell::child`](crate::topology::forest::TreeCell::child).
pub fn sub_entity_offsets<const D: usize>(dim: usize) -> Vec<[u8; D]> {
    let total = 3usize.pow(D as u32);
    let mut out = Vec::with_capacity(entities_per_cell(D, dim));
    for code in 0..total {
        let mut offset = [0u8; D];
        let mut rest = code;
        for o in offset.iter_mut() {
            *o = (rest % 3) as u8;
            rest /= 3;
        }
        if offset.iter().filter(|&&o| o == 1).count() == dim {
            out.push(offset);
        }
    }
    out
}

/// Number of sub-entities of dimension `dim` of a `cell_dim`-cube: `C(D, d) 2^(D-d)`.
pub const fn entities_per_cell(cell_dim: usize, dim: usize) -> usize {
    if dim > cell_dim {
        return 0;
    }
    binomial(cell_dim, dim) << (cell_dim - dim)
}

const fn binomial(n: usize, k: usize) -> usize {
    let mut r = 1;
    let mut i = 0;
    while i < k {
        r = r * (n - i) / (i + 1);
        i += 1;
    }
    r
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_match_hypercube() {
        assert_eq!(entities_per_cell(2, 0), 4);
        assert_eq!(entities_per_cell(2, 1), 4);
        assert_eq!(entities_per_cell(3, 1), 12);
        assert_eq!(entities_per_cell(3, 2), 6);
        assert_eq!(entities_per_cell(3, 3), 1);
        assert_eq!(sub_entity_offsets::<3>(1).len(), 12);
        assert_eq!(sub_entity_offsets::<3>(2).len(), 6);
    }

    #[test]
    fn vertex_order_is_child_order() {
        assert_eq!(
            sub_entity_offsets::<2>(0),
            vec![[0, 0], [2, 0], [0, 2], [2, 2]]
        );
    }
}
