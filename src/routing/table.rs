//! Route lookup and reverse URL generation.
//!
//! # Responsibilities
//! - Hold one immutable generation of the route tree
//! - Find the first leaf matching a path (recursive descent, declaration order)
//! - Rebuild a concrete URL from a route name and positional parameters
//!
//! # Design Decisions
//! - First match wins; there is no longest-match or specificity ranking
//! - Once a branch matches, only its children are searched
//! - Explicit `NotFound` carrying every pattern tested, for diagnostics

use super::pattern::{reverse_chain, RoutePattern};
use super::registry::HandlerRegistry;
use super::route::{compile, LeafRoute, Route};
use super::RouteError;
use crate::config::RouteConfig;

/// Paths starting with this are internal and never prefix-stripped.
pub const INTERNAL_MARKER: char = '#';

/// A successful lookup.
#[derive(Debug)]
pub struct RouteMatch<'a> {
    pub route: &'a LeafRoute,
    /// Captured groups from every pattern along the path, outermost first.
    pub groups: Vec<String>,
}

/// No route matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotFound {
    pub path: String,
    /// Sources of every pattern tried, in the order they were tried.
    pub tested: Vec<String>,
}

#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
    prefix: String,
}

impl RouteTable {
    pub fn new(routes: Vec<Route>) -> Self {
        Self {
            routes,
            prefix: String::new(),
        }
    }

    /// Strip `prefix` before matching and prepend it on reverse.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Build a tree from configuration records, resolving views and
    /// preconditions through `registry`.
    pub fn from_config(configs: &[RouteConfig], registry: &HandlerRegistry) -> Result<Self, RouteError> {
        let routes = configs
            .iter()
            .map(|config| build_route(config, registry))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(routes))
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn find(&self, path: &str) -> Result<RouteMatch<'_>, NotFound> {
        let remainder = if path.starts_with(INTERNAL_MARKER) {
            path
        } else {
            self.strip_prefix(path)
        };

        let mut groups = Vec::new();
        let mut tested = Vec::new();
        match descend(&self.routes, remainder, &mut groups, &mut tested) {
            Some(route) => Ok(RouteMatch { route, groups }),
            None => Err(NotFound {
                path: path.to_string(),
                tested,
            }),
        }
    }

    /// `path` without the URL prefix, if the prefix is a whole leading
    /// segment of it (`/site` strips from `/site/a`, not from `/sitemap`).
    fn strip_prefix<'p>(&self, path: &'p str) -> &'p str {
        match path.strip_prefix(self.prefix.as_str()) {
            Some(rest) if rest.is_empty() || rest.starts_with('/') || self.prefix.ends_with('/') => rest,
            _ => path,
        }
    }

    /// Concrete URL for the route called `name`.
    pub fn reverse<S: AsRef<str>>(&self, name: &str, params: &[S]) -> Result<String, RouteError> {
        let mut chain = Vec::new();
        if !chain_to(&self.routes, name, &mut chain) {
            return Err(RouteError::ViewNotFound(name.to_string()));
        }
        let mut url = self.prefix.clone();
        url.push_str(&reverse_chain(chain, params));
        Ok(url)
    }
}

fn descend<'a>(
    routes: &'a [Route],
    remainder: &str,
    groups: &mut Vec<String>,
    tested: &mut Vec<String>,
) -> Option<&'a LeafRoute> {
    for route in routes {
        tested.push(route.pattern().source().to_string());
        let Some((consumed, captured)) = route.pattern().match_prefix(remainder) else {
            continue;
        };
        groups.extend(captured);
        return match route {
            Route::Leaf(leaf) => Some(leaf),
            Route::Branch(branch) => descend(&branch.children, &remainder[consumed..], groups, tested),
        };
    }
    None
}

/// Depth-first search for `name`, leaving the patterns from root to leaf in `chain`.
fn chain_to<'a>(routes: &'a [Route], name: &str, chain: &mut Vec<&'a RoutePattern>) -> bool {
    for route in routes {
        match route {
            Route::Leaf(leaf) if leaf.name() == Some(name) => {
                chain.push(&leaf.pattern);
                return true;
            }
            Route::Leaf(_) => {}
            Route::Branch(branch) => {
                chain.push(&branch.pattern);
                if chain_to(&branch.children, name, chain) {
                    return true;
                }
                chain.pop();
            }
        }
    }
    false
}

fn build_route(config: &RouteConfig, registry: &HandlerRegistry) -> Result<Route, RouteError> {
    match (&config.view, config.sub.is_empty()) {
        (Some(_), false) => Err(RouteError::Conflicting(config.regex.clone())),
        (None, true) => Err(RouteError::MissingView(config.regex.clone())),
        (None, false) => {
            let children = config
                .sub
                .iter()
                .map(|child| build_route(child, registry))
                .collect::<Result<Vec<_>, _>>()?;
            Route::branch(&config.regex, children)
        }
        (Some(view), true) => {
            let handler = registry
                .view(view)
                .ok_or_else(|| RouteError::UnknownView(view.key()))?;
            let mut leaf = LeafRoute::new(compile(&config.regex)?, handler, view.key());
            leaf.name = config.name.clone();
            leaf.params = config.params.clone();
            for key in &config.precondition {
                let precondition = registry
                    .precondition(key)
                    .ok_or_else(|| RouteError::UnknownPrecondition(key.clone()))?;
                leaf.push_precondition(key.clone(), precondition);
            }
            Ok(Route::Leaf(leaf))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{Response, Reply};
    use serde_json::json;

    fn leaf(pattern: &str, body: &'static str) -> Route {
        Route::leaf(pattern, move |_, _, _| Ok(Response::ok(body).into()))
            .unwrap()
            .named(body)
            .into()
    }

    #[test]
    fn first_declared_match_wins() {
        let table = RouteTable::new(vec![leaf(r"^/a", "A"), leaf(r"^/a/b", "B")]);
        assert_eq!(table.find("/a/b").unwrap().route.name(), Some("A"));

        let table = RouteTable::new(vec![leaf(r"^/a/b", "B"), leaf(r"^/a", "A")]);
        assert_eq!(table.find("/a/b").unwrap().route.name(), Some("B"));
    }

    #[test]
    fn branch_hands_children_only_the_remainder() {
        let seen = std::sync::Arc::new(std::sync::Mutex::new(String::new()));
        let child_seen = seen.clone();
        // The child pattern captures everything it is given.
        let child = Route::leaf(r"(.*)", move |_, groups, _| {
            *child_seen.lock().unwrap() = groups.last().cloned().unwrap_or_default();
            Ok(Reply::Deferred)
        })
        .unwrap();
        let table = RouteTable::new(vec![Route::branch(r"^/blog/(\d+)", vec![child.into()]).unwrap()]);

        let found = table.find("/blog/2024/posts/hello").unwrap();
        assert_eq!(found.groups, vec!["2024", "/posts/hello"]);

        let mut req = crate::http::Request::internal("GET", "/blog/2024/posts/hello");
        let _ = (found.route.handler)(&mut req, &found.groups, None);
        assert_eq!(*seen.lock().unwrap(), "/posts/hello");
    }

    #[test]
    fn no_backtracking_out_of_a_matched_branch() {
        let table = RouteTable::new(vec![
            Route::branch(r"^/api", vec![leaf(r"^/v1$", "v1")]).unwrap(),
            leaf(r"^/api/other$", "other"),
        ]);
        let missing = table.find("/api/other").unwrap_err();
        assert_eq!(missing.tested, vec![r"^/api", r"^/v1$"]);
    }

    #[test]
    fn reverse_then_match_round_trips() {
        let table = RouteTable::new(vec![leaf(r"^/about$", "about"), leaf(r"^/home/(\d+)$", "home")]);
        let url = table.reverse("home", &["42"]).unwrap();
        assert_eq!(url, "/home/42");

        let found = table.find(&url).unwrap();
        assert_eq!(found.route.name(), Some("home"));
        assert_eq!(found.groups, vec!["42"]);
    }

    #[test]
    fn reverse_walks_ancestors() {
        let table = RouteTable::new(vec![Route::branch(
            r"^/users/(\d+)",
            vec![leaf(r"^/files/([\w-]+)\.txt$", "user_file")],
        )
        .unwrap()])
        .with_prefix("/app");

        let url = table.reverse("user_file", &["3", "notes"]).unwrap();
        assert_eq!(url, "/app/users/3/files/notes.txt");
        assert_eq!(table.find(&url).unwrap().groups, vec!["3", "notes"]);
    }

    #[test]
    fn reverse_unknown_name_fails() {
        let table = RouteTable::new(vec![leaf(r"^/", "root")]);
        assert!(matches!(
            table.reverse("nope", &[] as &[&str]),
            Err(RouteError::ViewNotFound(name)) if name == "nope"
        ));
    }

    #[test]
    fn duplicate_names_resolve_depth_first() {
        let table = RouteTable::new(vec![
            Route::branch(r"^/first", vec![leaf(r"^/x$", "dup")]).unwrap(),
            leaf(r"^/second$", "dup"),
        ]);
        assert_eq!(table.reverse("dup", &[] as &[&str]).unwrap(), "/first/x");
    }

    #[test]
    fn prefix_is_skipped_for_internal_paths() {
        let table = RouteTable::new(vec![leaf(r"^#status$", "status"), leaf(r"^/page$", "page")])
            .with_prefix("/site");
        assert_eq!(table.find("/site/page").unwrap().route.name(), Some("page"));
        assert_eq!(table.find("#status").unwrap().route.name(), Some("status"));
        // Paths without the prefix are matched as-is.
        assert_eq!(table.find("/page").unwrap().route.name(), Some("page"));
    }

    #[test]
    fn prefix_only_strips_whole_segments() {
        let table = RouteTable::new(vec![leaf(r"^map$", "bare"), leaf(r"^/sitemap$", "sitemap"), leaf(r"^/?$", "root")])
            .with_prefix("/site");
        assert_eq!(table.find("/sitemap").unwrap().route.name(), Some("sitemap"));
        assert_eq!(table.find("/site").unwrap().route.name(), Some("root"));

        let slashed = RouteTable::new(vec![leaf(r"^page$", "page")]).with_prefix("/site/");
        assert_eq!(slashed.find("/site/page").unwrap().route.name(), Some("page"));
    }

    #[test]
    fn builds_from_config() {
        let mut registry = HandlerRegistry::new();
        registry
            .register_view("views::echo", |_, _, _| Ok(Response::ok("echo").into()))
            .register_method("Blog", "show", |_, _, params| {
                Ok(Response::ok(params.map(|p| p.to_string()).unwrap_or_default()).into())
            })
            .register_precondition("auth::open", |_| crate::routing::Gate::Continue);

        let configs: Vec<RouteConfig> = serde_json::from_value(json!([
            { "regex": "^/echo$", "view": "views::echo", "name": "echo" },
            { "regex": "^/blog", "sub": [
                { "regex": "^/(\\d+)$", "view": ["Blog", "show"], "name": "post",
                  "precondition": ["auth::open"], "params": { "layout": "wide" } }
            ]}
        ]))
        .unwrap();

        let table = RouteTable::from_config(&configs, &registry).unwrap();
        let found = table.find("/blog/9").unwrap();
        assert_eq!(found.route.view(), "Blog::show");
        assert_eq!(found.route.params(), Some(&json!({ "layout": "wide" })));
        assert_eq!(found.route.preconditions.len(), 1);
        assert_eq!(table.reverse("post", &["9"]).unwrap(), "/blog/9");
    }

    #[test]
    fn config_errors_are_reported() {
        let mut registry = HandlerRegistry::new();
        registry.register_view("v", |_, _, _| Ok(Reply::Deferred));
        let build = |value: serde_json::Value| {
            let configs: Vec<RouteConfig> = serde_json::from_value(value).unwrap();
            RouteTable::from_config(&configs, &registry).unwrap_err()
        };

        assert!(matches!(build(json!([{ "regex": "^/x" }])), RouteError::MissingView(_)));
        assert!(matches!(
            build(json!([{ "regex": "^/x", "view": "views::nope" }])),
            RouteError::UnknownView(key) if key == "views::nope"
        ));
        assert!(matches!(
            build(json!([{ "regex": "^/x", "view": "v", "precondition": ["auth::nope"] }])),
            RouteError::UnknownPrecondition(key) if key == "auth::nope"
        ));
        assert!(matches!(
            build(json!([{ "regex": "(", "view": "v" }])),
            RouteError::InvalidPattern { .. }
        ));
        assert!(matches!(
            build(json!([{ "regex": "^/x", "view": "v", "sub": [{ "regex": "^/y", "view": "v" }] }])),
            RouteError::Conflicting(_)
        ));
    }
}
