//! Reusable tree shapes.
//!
//! The fixtures are built through a caller-supplied `create` function so the
//! same shape can be grown directly in a `Tree`, through a `Company`, or
//! through a running `Stage`.

use troupe_core::NodeId;

/// The six-node tree used by the audience tests:
///
/// ```text
/// A
/// ├── B
/// │   ├── C
/// │   └── D
/// ├── E
/// └── F
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SampleTree {
    pub a: NodeId,
    pub b: NodeId,
    pub c: NodeId,
    pub d: NodeId,
    pub e: NodeId,
    pub f: NodeId,
}

impl SampleTree {
    /// Node names in creation (and pre-order) order.
    pub const NAMES: [&'static str; 6] = ["A", "B", "C", "D", "E", "F"];

    /// Build the shape. `create(name, parent)` must attach a new node and
    /// return its id; `A` is created with no parent.
    pub fn build<E>(
        mut create: impl FnMut(&'static str, Option<NodeId>) -> Result<NodeId, E>,
    ) -> Result<Self, E> {
        let a = create("A", None)?;
        let b = create("B", Some(a))?;
        let c = create("C", Some(b))?;
        let d = create("D", Some(b))?;
        let e = create("E", Some(a))?;
        let f = create("F", Some(a))?;
        Ok(Self { a, b, c, d, e, f })
    }

    /// All ids in pre-order.
    pub fn preorder(&self) -> [NodeId; 6] {
        [self.a, self.b, self.c, self.d, self.e, self.f]
    }

    /// Name of `id`, if it is one of the fixture nodes.
    pub fn name_of(&self, id: NodeId) -> Option<&'static str> {
        self.preorder()
            .iter()
            .position(|&n| n == id)
            .map(|i| Self::NAMES[i])
    }
}

/// Build a chain `depth` nodes deep, each the only child of the previous.
pub fn chain<E>(
    depth: usize,
    mut create: impl FnMut(usize, Option<NodeId>) -> Result<NodeId, E>,
) -> Result<Vec<NodeId>, E> {
    let mut ids = Vec::with_capacity(depth);
    let mut parent = None;
    for level in 0..depth {
        let id = create(level, parent)?;
        ids.push(id);
        parent = Some(id);
    }
    Ok(ids)
}
