//! Nesting per-route elements into one tree.

use arbor_wire::{Element, ElementKind, Node, RouteElement};

/// Compose route elements, root first, into a single node.
///
/// Each element's first outlet receives the composition of the routes below
/// it. An error element ends the chain: routes below the boundary that
/// caught the error are not rendered.
pub fn compose_route_view<'a>(elements: impl IntoIterator<Item = &'a RouteElement>) -> Node {
    let mut chain = Vec::new();
    for element in elements {
        chain.push(element.node());
        if element.is_error() {
            break;
        }
    }

    chain.into_iter().rev().fold(Node::Null, |inner, outer| {
        let mut outer = outer.clone();
        let mut slot = Some(inner);
        fill_outlet(&mut outer, &mut slot);
        outer
    })
}

/// Replace the first outlet in `node` with the contents of `slot`.
fn fill_outlet(node: &mut Node, slot: &mut Option<Node>) {
    if slot.is_none() {
        return;
    }
    match node {
        Node::Element(element) if element.kind == ElementKind::Outlet => {
            if let Some(inner) = slot.take() {
                *node = inner;
            }
        }
        Node::Element(element) => fill_children(element, slot),
        Node::Array(items) => {
            for item in items {
                fill_outlet(item, slot);
            }
        }
        _ => {}
    }
}

fn fill_children(element: &mut Element, slot: &mut Option<Node>) {
    for child in &mut element.children {
        fill_outlet(child, slot);
        if slot.is_none() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(tag: &str) -> RouteElement {
        RouteElement::Normal(Element::new(tag).child(Element::outlet()).into())
    }

    #[test]
    fn test_nests_children_into_outlets() {
        let elements = [
            layout("html"),
            layout("main"),
            RouteElement::Normal(Element::new("p").child("leaf").into()),
        ];
        let expected: Node = Element::new("html")
            .child(Element::new("main").child(Element::new("p").child("leaf")))
            .into();
        assert_eq!(compose_route_view(&elements), expected);
    }

    #[test]
    fn test_error_element_ends_chain() {
        let elements = [
            layout("html"),
            RouteElement::Error(Element::new("h1").child("oops").into()),
            RouteElement::Normal(Element::new("p").child("unreachable").into()),
        ];
        let expected: Node = Element::new("html").child(Element::new("h1").child("oops")).into();
        assert_eq!(compose_route_view(&elements), expected);
    }

    #[test]
    fn test_leaf_outlet_renders_nothing() {
        let elements = [layout("div")];
        let expected: Node = Element::new("div").child(Node::Null).into();
        assert_eq!(compose_route_view(&elements), expected);
        assert_eq!(compose_route_view(std::iter::empty()), Node::Null);
    }
}
