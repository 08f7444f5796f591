//! Audience resolution: who hears a message, given the tree shape and the
//! tone it was sent in.
//!
//! | Tone      | Audience                                               |
//! |-----------|--------------------------------------------------------|
//! | `Yell`    | every attached actor, pre-order from the root          |
//! | `Command` | the sender's direct children, in child-list order      |
//! | `Say`     | the sender's parent, then the parent's other children  |
//! | `Whisper` | the named recipient                                    |
//! | `Think`   | the sender                                             |
//!
//! Only attached actors are ever included. Each visited node is read-locked
//! only while it is inspected.

use troupe_arena::{ArenaError, Depth, Lifecycle, Tree};
use troupe_core::{NodeId, Tone, ToneError};

use crate::error::EngineError;

/// Compute the ordered list of actors that should receive a message.
///
/// The sender must be live (attached or benched). A whisper requires a
/// recipient; a whisper to a benched recipient resolves to nobody.
pub fn resolve_audience<P>(
    tree: &Tree<P>,
    sender: NodeId,
    tone: Tone,
    recipient: Option<NodeId>,
) -> Result<Vec<NodeId>, EngineError> {
    let sender_state = tree.state(sender)?;
    let mut audience = Vec::new();
    match tone {
        Tone::Yell => {
            if let Some(root) = tree.root()? {
                collect(tree, root, Depth::Recursive, None, &mut audience)?;
            }
        }
        Tone::Command => {
            tree.map_subtree(sender, Depth::Children, |id, links| {
                if id != sender && links.state() == Lifecycle::Attached {
                    audience.push(id);
                }
            })?;
        }
        Tone::Say => {
            if let Some(parent) = tree.parent(sender)? {
                // A benched sender may remember a parent that is gone.
                match collect(tree, parent, Depth::Children, Some(sender), &mut audience) {
                    Ok(()) | Err(ArenaError::NotInUse { .. }) => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Tone::Whisper => {
            let recipient = recipient.ok_or(ToneError::MissingRecipient)?;
            if tree.state(recipient)? == Lifecycle::Attached {
                audience.push(recipient);
            }
        }
        Tone::Think => {
            if sender_state == Lifecycle::Attached {
                audience.push(sender);
            }
        }
    }
    Ok(audience)
}

/// Push every attached node of the walk, except `skip`.
fn collect<P>(
    tree: &Tree<P>,
    start: NodeId,
    depth: Depth,
    skip: Option<NodeId>,
    out: &mut Vec<NodeId>,
) -> Result<(), ArenaError> {
    tree.map_subtree(start, depth, |id, links| {
        if Some(id) != skip && links.state() == Lifecycle::Attached {
            out.push(id);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use troupe_arena::{ArenaConfig, Unlink};
    use troupe_core::ThreadTag;

    /// A{B{C,D},E,F}, returned in pre-order.
    fn sample() -> (Tree<()>, [NodeId; 6]) {
        let tree = Tree::new(ArenaConfig::new(8)).unwrap();
        let add = |parent| tree.add_reference((), parent, ThreadTag(0)).unwrap();
        let a = add(None);
        let b = add(Some(a));
        let c = add(Some(b));
        let d = add(Some(b));
        let e = add(Some(a));
        let f = add(Some(a));
        (tree, [a, b, c, d, e, f])
    }

    #[test]
    fn yell_reaches_everyone_in_preorder() {
        let (tree, ids) = sample();
        let [_, _, c, ..] = ids;
        assert_eq!(
            resolve_audience(&tree, c, Tone::Yell, None).unwrap(),
            ids.to_vec()
        );
    }

    #[test]
    fn command_reaches_children() {
        let (tree, [a, b, c, d, e, f]) = sample();
        assert_eq!(
            resolve_audience(&tree, a, Tone::Command, None).unwrap(),
            vec![b, e, f]
        );
        assert_eq!(
            resolve_audience(&tree, b, Tone::Command, None).unwrap(),
            vec![c, d]
        );
        assert!(resolve_audience(&tree, f, Tone::Command, None)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn say_reaches_parent_then_siblings() {
        let (tree, [a, b, c, d, e, f]) = sample();
        assert_eq!(
            resolve_audience(&tree, e, Tone::Say, None).unwrap(),
            vec![a, b, f]
        );
        assert_eq!(
            resolve_audience(&tree, c, Tone::Say, None).unwrap(),
            vec![b, d]
        );
        assert!(resolve_audience(&tree, a, Tone::Say, None)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn whisper_and_think() {
        let (tree, [a, _, c, d, ..]) = sample();
        assert_eq!(
            resolve_audience(&tree, c, Tone::Whisper, Some(d)).unwrap(),
            vec![d]
        );
        assert_eq!(
            resolve_audience(&tree, c, Tone::Whisper, None),
            Err(EngineError::Tone(ToneError::MissingRecipient))
        );
        assert_eq!(resolve_audience(&tree, a, Tone::Think, None).unwrap(), vec![a]);
    }

    #[test]
    fn benched_actors_are_not_heard() {
        let (tree, [a, b, c, _, e, f]) = sample();
        tree.unlink_reference(b, Unlink::Bench).unwrap();
        assert_eq!(
            resolve_audience(&tree, e, Tone::Yell, None).unwrap(),
            vec![a, e, f]
        );
        assert_eq!(
            resolve_audience(&tree, e, Tone::Whisper, Some(c)).unwrap(),
            Vec::<NodeId>::new()
        );
        assert!(resolve_audience(&tree, c, Tone::Think, None)
            .unwrap()
            .is_empty());
        // The benched subtree is still internally linked.
        assert_eq!(
            resolve_audience(&tree, c, Tone::Say, None).unwrap(),
            Vec::<NodeId>::new()
        );
    }

    #[test]
    fn stale_sender_is_rejected() {
        let (tree, [_, b, ..]) = sample();
        tree.unlink_reference(b, Unlink::Delete).unwrap();
        assert_eq!(
            resolve_audience(&tree, b, Tone::Think, None),
            Err(EngineError::Arena(ArenaError::NotInUse { id: b }))
        );
    }
}
