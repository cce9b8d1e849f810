// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Plain-text rendering of the mirrored scene.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use scenelink_proto::{AttrValue, Handle, PinInfo};
use scenelink_sync::{Child, Scene};

/// Render the tree, one record per line.
///
/// Owned items and collapsed pin sources are nested under their parent.
/// Expanded pin sources are printed as a reference since they appear at
/// their own place in the tree.
pub fn render_tree(scene: &Scene) -> String {
    let mut out = String::new();
    let mut path = Vec::new();
    let expanded = scene.expanded();
    for handle in scene.tree() {
        render_record(scene, &expanded, *handle, 0, None, &mut path, &mut out);
    }
    if scene.is_stale() {
        out.push_str("(mirror is stale; rebuild to refresh)\n");
    }
    out
}

fn render_record(
    scene: &Scene,
    expanded: &BTreeSet<Handle>,
    handle: Handle,
    depth: usize,
    via: Option<&PinInfo>,
    path: &mut Vec<Handle>,
    out: &mut String,
) {
    let indent = "  ".repeat(depth);
    let label = via.map(|pin| format!("{} <- ", pin.label)).unwrap_or_default();
    let Some(record) = scene.lookup(handle) else {
        let _ = writeln!(out, "{indent}{label}{handle} (not mirrored)");
        return;
    };
    let collapsed = if expanded.contains(&handle) {
        ""
    } else {
        " (collapsed)"
    };
    let _ = writeln!(
        out,
        "{indent}{label}{handle} {} [{}]{collapsed}",
        record.name, record.type_tag
    );
    if path.contains(&handle) {
        return;
    }
    path.push(handle);
    for child in &record.children {
        match child {
            Child::Unconnected(pin) => {
                let _ = writeln!(out, "{indent}  {} <- (none)", pin.label);
            }
            Child::Linked { handle: child, pin } => {
                let shown_elsewhere = pin.is_some() && expanded.contains(child);
                if shown_elsewhere {
                    let name = scene.lookup(*child).map_or("?", |r| r.name.as_str());
                    let pin_label = pin.as_ref().map_or("", |p| p.label.as_str());
                    let _ = writeln!(out, "{indent}  {pin_label} <- {child} {name}");
                } else {
                    render_record(
                        scene,
                        expanded,
                        *child,
                        depth + 1,
                        pin.as_ref(),
                        path,
                        out,
                    );
                }
            }
        }
    }
    path.pop();
}

/// One-line form of an attribute value.
pub fn format_value(value: &AttrValue) -> String {
    fn join<T: ToString>(parts: &[T]) -> String {
        parts
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }
    match value {
        AttrValue::Bool(v) => v.to_string(),
        AttrValue::Int(v) => v.to_string(),
        AttrValue::Int2(v) => join(v),
        AttrValue::Int3(v) => join(v),
        AttrValue::Float(v) => v.to_string(),
        AttrValue::Float2(v) => join(v),
        AttrValue::Float3(v) => join(v),
        AttrValue::Float4(v) => join(v),
        AttrValue::Text(v) => v.clone(),
    }
}
