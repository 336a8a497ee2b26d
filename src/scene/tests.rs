//! Unit tests for scene visibility
//!
//! Exercises overlapping visibility reasons, ancestor propagation and the
//! closed-window lifecycle.

use super::*;
use anyhow::Result;

#[test]
fn test_new_window_is_visible() -> Result<()> {
    let mut scene = SceneGraph::new();
    let window = scene.attach_window(1, None)?;

    assert!(scene.is_visible(window));
    assert!(scene.compute_visibility(window)?);
    assert_eq!(scene.visible_windows(), vec![1]);
    Ok(())
}

#[test]
fn test_overlapping_reasons_keep_hidden_window_visible() -> Result<()> {
    let mut scene = SceneGraph::new();
    let window = scene.attach_window(1, None)?;
    scene.set_hidden(window, true)?;
    assert!(!scene.is_visible(window));

    scene.ref_visible(window, VisibilityReason::Minimized)?;
    scene.ref_visible(window, VisibilityReason::Deleting)?;
    scene.unref_visible(window, VisibilityReason::Minimized)?;
    assert!(scene.is_visible(window));

    scene.unref_visible(window, VisibilityReason::Deleting)?;
    assert!(!scene.is_visible(window));
    assert!(!scene.compute_visibility(window)?);
    Ok(())
}

#[test]
fn test_same_reason_is_ref_counted() -> Result<()> {
    let mut scene = SceneGraph::new();
    let window = scene.attach_window(1, None)?;
    scene.set_hidden(window, true)?;

    scene.ref_visible(window, VisibilityReason::OnOtherDesktop)?;
    scene.ref_visible(window, VisibilityReason::OnOtherDesktop)?;
    assert_eq!(
        scene.refcount(window, VisibilityReason::OnOtherDesktop),
        Some(2)
    );

    scene.unref_visible(window, VisibilityReason::OnOtherDesktop)?;
    assert!(scene.is_visible(window));
    scene.unref_visible(window, VisibilityReason::OnOtherDesktop)?;
    assert!(!scene.is_visible(window));
    Ok(())
}

#[test]
fn test_unref_without_ref_is_a_noop() -> Result<()> {
    let mut scene = SceneGraph::new();
    let window = scene.attach_window(1, None)?;

    let result = scene.unref_visible(window, VisibilityReason::OnOtherActivity);
    assert!(matches!(
        result,
        Err(PacingError::ResourceImbalance {
            what: Imbalance::Visibility {
                reason: VisibilityReason::OnOtherActivity,
                ..
            }
        })
    ));
    assert_eq!(
        scene.refcount(window, VisibilityReason::OnOtherActivity),
        Some(0)
    );
    assert!(scene.is_visible(window));
    Ok(())
}

#[test]
fn test_hidden_ancestor_hides_descendants() -> Result<()> {
    let mut scene = SceneGraph::new();
    let desktop = scene.add_container(None)?;
    let window = scene.attach_window(1, Some(desktop))?;
    let surface = scene.set_surface(window, true)?.unwrap();

    scene.set_hidden(desktop, true)?;
    assert!(!scene.is_visible(window));
    assert!(!scene.is_visible(surface));
    assert!(scene.visible_windows().is_empty());

    scene.set_hidden(desktop, false)?;
    assert!(scene.is_visible(surface));
    Ok(())
}

#[test]
fn test_ref_forces_ancestors_visible() -> Result<()> {
    let mut scene = SceneGraph::new();
    let desktop = scene.add_container(None)?;
    let sibling = scene.attach_window(1, Some(desktop))?;
    let window = scene.attach_window(2, Some(desktop))?;
    scene.set_hidden(desktop, true)?;
    scene.set_hidden(window, true)?;

    // Desktop switch animation keeps the window and its desktop on screen
    scene.ref_visible(window, VisibilityReason::OnOtherDesktop)?;
    assert!(scene.is_visible(desktop));
    assert!(scene.is_visible(window));
    assert!(scene.compute_visibility(desktop)?);
    // The sibling is not hidden itself, so it shows up with its parent
    assert!(scene.is_visible(sibling));

    scene.unref_visible(window, VisibilityReason::OnOtherDesktop)?;
    assert!(!scene.is_visible(desktop));
    assert!(!scene.is_visible(window));
    assert!(!scene.is_visible(sibling));
    Ok(())
}

#[test]
fn test_closed_window_lives_while_held() -> Result<()> {
    let mut scene = SceneGraph::new();
    let window = scene.attach_window(9, None)?;
    scene.set_surface(window, true)?;
    scene.set_shadow(window, true)?;

    scene.ref_visible(window, VisibilityReason::Deleting)?;
    assert!(!scene.handle_window_closed(window)?);
    assert!(scene.contains(window));
    assert!(scene.is_visible(window));
    assert_eq!(scene.visible_windows(), vec![9]);

    scene.unref_visible(window, VisibilityReason::Deleting)?;
    assert!(!scene.contains(window));
    assert!(scene.is_empty());
    assert!(scene.roots().is_empty());
    Ok(())
}

#[test]
fn test_closed_window_without_holds_is_reaped() -> Result<()> {
    let mut scene = SceneGraph::new();
    let desktop = scene.add_container(None)?;
    let window = scene.attach_window(3, Some(desktop))?;
    scene.set_decoration(window, true)?;

    assert!(scene.handle_window_closed(window)?);
    assert!(!scene.contains(window));
    assert_eq!(scene.len(), 1);
    assert!(scene.get(desktop).unwrap().children().is_empty());
    Ok(())
}

#[test]
fn test_minimized_and_closing_window_needs_both_releases() -> Result<()> {
    let mut scene = SceneGraph::new();
    let window = scene.attach_window(4, None)?;

    scene.ref_visible(window, VisibilityReason::Minimized)?;
    scene.ref_visible(window, VisibilityReason::Deleting)?;
    scene.handle_window_closed(window)?;

    scene.unref_visible(window, VisibilityReason::Deleting)?;
    assert!(scene.contains(window));
    assert!(scene.is_visible(window));

    scene.unref_visible(window, VisibilityReason::Minimized)?;
    assert!(!scene.contains(window));
    Ok(())
}

#[test]
fn test_closed_window_held_through_child_is_reaped_on_release() -> Result<()> {
    let mut scene = SceneGraph::new();
    let desktop = scene.add_container(None)?;
    let window = scene.attach_window(7, Some(desktop))?;
    let surface = scene.set_surface(window, true)?.unwrap();
    let decoration = scene.set_decoration(window, true)?.unwrap();

    scene.ref_visible(surface, VisibilityReason::Deleting)?;
    assert!(!scene.handle_window_closed(window)?);
    assert!(scene.get(window).unwrap().is_closed());
    assert!(scene.is_visible(window));
    assert_eq!(scene.visible_windows(), vec![7]);

    scene.unref_visible(surface, VisibilityReason::Deleting)?;
    assert!(!scene.contains(window));
    assert!(!scene.contains(surface));
    assert!(!scene.contains(decoration));
    assert_eq!(scene.len(), 1);
    assert!(scene.get(desktop).unwrap().children().is_empty());
    assert!(!scene.get(desktop).unwrap().is_held());
    Ok(())
}

#[test]
fn test_removing_held_child_reaps_closed_window() -> Result<()> {
    let mut scene = SceneGraph::new();
    let window = scene.attach_window(8, None)?;
    let shadow = scene.set_shadow(window, true)?.unwrap();

    scene.ref_visible(shadow, VisibilityReason::Minimized)?;
    assert!(!scene.handle_window_closed(window)?);

    assert_eq!(scene.set_shadow(window, false)?, None);
    assert!(!scene.contains(window));
    assert!(scene.is_empty());
    assert!(scene.roots().is_empty());
    Ok(())
}

#[test]
fn test_closed_window_held_by_itself_and_child() -> Result<()> {
    let mut scene = SceneGraph::new();
    let window = scene.attach_window(5, None)?;
    let surface = scene.set_surface(window, true)?.unwrap();

    scene.ref_visible(window, VisibilityReason::Deleting)?;
    scene.ref_visible(surface, VisibilityReason::OnOtherDesktop)?;
    scene.handle_window_closed(window)?;

    scene.unref_visible(surface, VisibilityReason::OnOtherDesktop)?;
    assert!(scene.contains(window));
    assert!(scene.is_visible(surface));

    scene.unref_visible(window, VisibilityReason::Deleting)?;
    assert!(scene.is_empty());
    Ok(())
}

#[test]
fn test_only_window_nodes_can_be_closed() -> Result<()> {
    let mut scene = SceneGraph::new();
    let desktop = scene.add_container(None)?;
    let window = scene.attach_window(6, Some(desktop))?;
    let surface = scene.set_surface(window, true)?.unwrap();

    for node in [desktop, surface] {
        assert!(matches!(
            scene.handle_window_closed(node),
            Err(PacingError::Configuration(_))
        ));
        assert!(!scene.get(node).unwrap().is_closed());
    }
    assert_eq!(scene.len(), 3);
    assert_eq!(scene.visible_windows(), vec![6]);
    Ok(())
}

#[test]
fn test_refs_snapshot() -> Result<()> {
    let mut scene = SceneGraph::new();
    let window = scene.attach_window(2, None)?;

    scene.ref_visible(window, VisibilityReason::Hidden)?;
    scene.ref_visible(window, VisibilityReason::OnOtherActivity)?;
    scene.ref_visible(window, VisibilityReason::OnOtherActivity)?;

    let refs = scene.get(window).unwrap().refs();
    assert_eq!(refs.total(), 3);
    assert_eq!(refs.get(VisibilityReason::OnOtherActivity), 2);
    assert!(refs.any());

    scene.unref_visible(window, VisibilityReason::Hidden)?;
    assert_eq!(scene.get(window).unwrap().refs().total(), 2);
    Ok(())
}

#[test]
fn test_child_slots() -> Result<()> {
    let mut scene = SceneGraph::new();
    let window = scene.attach_window(5, None)?;

    let surface = scene.set_surface(window, true)?.unwrap();
    assert_eq!(scene.set_surface(window, true)?, Some(surface));
    assert_eq!(scene.get(surface).unwrap().kind(), NodeKind::Surface);
    assert_eq!(scene.get(surface).unwrap().window(), Some(5));

    let shadow = scene.set_shadow(window, true)?.unwrap();
    assert_eq!(
        scene.get(window).unwrap().child(ChildSlot::Shadow),
        Some(shadow)
    );

    assert_eq!(scene.set_shadow(window, false)?, None);
    assert!(!scene.contains(shadow));
    assert_eq!(scene.get(window).unwrap().child(ChildSlot::Shadow), None);
    assert_eq!(scene.get(window).unwrap().children(), &[surface]);

    assert!(scene.set_surface(surface, true).is_err());
    Ok(())
}

#[test]
fn test_held_child_keeps_hidden_window_visible() -> Result<()> {
    let mut scene = SceneGraph::new();
    let window = scene.attach_window(6, None)?;
    let surface = scene.set_surface(window, true)?.unwrap();
    scene.set_hidden(window, true)?;

    scene.ref_visible(surface, VisibilityReason::Hidden)?;
    assert!(scene.is_visible(window));
    assert!(scene.is_visible(surface));

    // Dropping the held child releases the window as well
    scene.set_surface(window, false)?;
    assert!(!scene.is_visible(window));
    assert!(!scene.compute_visibility(window)?);
    Ok(())
}

#[test]
fn test_paint_list_order() -> Result<()> {
    let mut scene = SceneGraph::new();
    let bottom = scene.attach_window(1, None)?;
    let bottom_surface = scene.set_surface(bottom, true)?.unwrap();
    let top = scene.attach_window(2, None)?;
    let hidden = scene.attach_window(3, None)?;
    scene.set_hidden(hidden, true)?;

    assert_eq!(scene.paint_list(), vec![bottom, bottom_surface, top]);
    assert_eq!(scene.visible_windows(), vec![1, 2]);
    Ok(())
}

#[test]
fn test_unknown_node() {
    let mut scene = SceneGraph::new();
    let ghost = NodeId::new(42);

    assert_eq!(
        scene.ref_visible(ghost, VisibilityReason::Hidden),
        Err(PacingError::UnknownNode(ghost))
    );
    assert!(scene.compute_visibility(ghost).is_err());
    assert!(!scene.is_visible(ghost));
    assert!(scene.attach_window(1, Some(ghost)).is_err());
    assert!(scene.is_empty());
}
