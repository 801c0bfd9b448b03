//! A small shop used by the `serve` command and the end-to-end tests.
//!
//! ```text
//! /                 root layout, site name
//! ├── (index)       product list
//! ├── products/:id  product page, 404 for unknown ids
//! ├── cart          item count; POST adds items
//! ├── recent        client loader decorating the server's list
//! ├── account       redirects to /login
//! └── login
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use arbor_client::ClientModules;
use arbor_core::RouteDescriptor;
use arbor_server::{App, DataArgs, RouteModule, ServerConfig, ServerFunctions, Thrown};
use arbor_wire::{ClientReference, Element, Node, ServerReference};

const CATALOG: [(&str, &str); 3] = [("1", "Oak table"), ("2", "Birch chair"), ("3", "Maple shelf")];

/// Shared state behind the demo's loaders and actions.
#[derive(Debug, Clone, Default)]
pub struct Shop {
    cart: Arc<AtomicI64>,
}

impl Shop {
    #[must_use]
    pub fn cart_items(&self) -> i64 {
        self.cart.load(Ordering::SeqCst)
    }
}

pub struct Demo {
    pub app: App,
    pub shop: Shop,
    /// Server function emptying the cart.
    pub clear_cart: ServerReference,
}

#[must_use]
pub fn recent_client_loader() -> ClientReference {
    ClientReference::new("routes/recent.js", "clientLoader")
}

#[must_use]
pub fn cart_should_revalidate() -> ClientReference {
    ClientReference::new("routes/cart.js", "shouldRevalidate")
}

fn product_name(id: &str) -> Option<&'static str> {
    CATALOG.iter().find(|(key, _)| *key == id).map(|(_, name)| *name)
}

async fn product(args: DataArgs) -> Result<Node, Thrown> {
    let id = args.param("id").unwrap_or_default();
    let name = product_name(id).ok_or_else(|| Thrown::response(404, format!("no product {id}")))?;
    Ok(Node::object([("id", Node::from(id)), ("name", Node::from(name))]))
}

fn routes() -> Vec<RouteDescriptor> {
    vec![RouteDescriptor::new("root").with_path("/").with_children([
        RouteDescriptor::new("home").index(),
        RouteDescriptor::new("product").with_path("products/:id"),
        RouteDescriptor::new("cart").with_path("cart"),
        RouteDescriptor::new("recent").with_path("recent"),
        RouteDescriptor::new("account").with_path("account"),
        RouteDescriptor::new("login").with_path("login"),
    ])]
}

/// Build the demo application.
///
/// # Errors
///
/// Fails only if the route table is inconsistent with the modules.
pub fn demo(config: ServerConfig) -> arbor_server::Result<Demo> {
    let shop = Shop::default();
    let functions = ServerFunctions::new();
    let clear_cart = {
        let cart = Arc::clone(&shop.cart);
        functions.register("cart#clear", move |_args: Vec<Node>| {
            let cart = Arc::clone(&cart);
            async move { Ok(Node::from(cart.swap(0, Ordering::SeqCst))) }
        })
    };

    let read_cart = Arc::clone(&shop.cart);
    let write_cart = Arc::clone(&shop.cart);
    let app = App::builder()
        .config(config)
        .routes(routes())
        .module(
            "root",
            RouteModule::new()
                .loader(|_| async { Ok(Node::from("Arbor Shop")) })
                .layout(|children| Element::new("body").child(children).into())
                .error_boundary(|props| {
                    Element::new("main")
                        .prop("status", i64::from(props.error.status))
                        .child(props.error.message.clone())
                        .into()
                })
                .imports(["root.js"]),
        )
        .module(
            "home",
            RouteModule::new()
                .loader(|_| async {
                    Ok(Node::Array(CATALOG.iter().map(|(_, name)| Node::from(*name)).collect()))
                })
                .component(|props| Element::new("ul").child(props.loader_data.clone()).into()),
        )
        .module(
            "product",
            RouteModule::new()
                .loader(product)
                .component(|props| {
                    Element::new("h1")
                        .child(props.loader_data.get("name").cloned().unwrap_or_default())
                        .into()
                })
                .hydrate_fallback(|params| {
                    Element::new("p")
                        .child(format!("loading product {}", params.get("id").map_or("", String::as_str)))
                        .into()
                }),
        )
        .lazy_module("cart", move || {
            let read_cart = Arc::clone(&read_cart);
            let write_cart = Arc::clone(&write_cart);
            async move {
                Ok(RouteModule::new()
                    .loader(move |_| {
                        let cart = Arc::clone(&read_cart);
                        async move { Ok(Node::from(cart.load(Ordering::SeqCst))) }
                    })
                    .action(move |args| {
                        let cart = Arc::clone(&write_cart);
                        async move {
                            let qty: i64 = args
                                .request
                                .form()
                                .get("qty")
                                .and_then(|qty| qty.parse().ok())
                                .ok_or_else(|| Thrown::response(400, "qty must be a number"))?;
                            Ok(Node::from(cart.fetch_add(qty, Ordering::SeqCst).saturating_add(qty)))
                        }
                    })
                    .should_revalidate(cart_should_revalidate())
                    .component(|props| Element::new("p").child(props.loader_data.clone()).into()))
            }
        })
        .module(
            "recent",
            RouteModule::new()
                .loader(|_| async { Ok(Node::Array(vec![Node::from("Oak table")])) })
                .client_loader(recent_client_loader()),
        )
        .module("account", RouteModule::new().loader(|_| async { Err(Thrown::redirect("/login")) }))
        .module(
            "login",
            RouteModule::new().component(|_| Element::new("form").prop("method", "post").into()),
        )
        .server_functions(functions)
        .build()?;

    Ok(Demo { app, shop, clear_cart })
}

/// Client code for the demo's client references.
#[must_use]
pub fn client_modules() -> ClientModules {
    ClientModules::new()
        .client_loader(&recent_client_loader(), |args| async move {
            let server = args.server.get().await?;
            Ok(Node::object([("viewed", server), ("source", Node::from("client"))]))
        })
        // The cart always reflects the server.
        .should_revalidate(&cart_should_revalidate(), |_| true)
}
