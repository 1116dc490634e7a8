//! Ordered route table with `{name}` path patterns
//!
//! Patterns are compiled to anchored regexes once, at registration. Requests
//! resolve against routes in registration order, so overlapping patterns are
//! first-registered-wins. Handler failures never escape the router: errors and
//! panics both come back as a 500 `RouteResult`.

use std::{collections::HashMap, fmt, future::Future, pin::Pin, str::FromStr, sync::Arc};

use regex::Regex;
use tracing::{debug, error};

use crate::errors::{panic_message, AppError, RouterError};
use crate::http::context::{RequestContext, RouteResult};
use crate::http::query;

pub type HandlerResult = Result<RouteResult, AppError>;
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;
pub type Handler = Arc<dyn Fn(RequestContext) -> BoxFuture<HandlerResult> + Send + Sync>;

/// Boxes an async closure into a [`Handler`].
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(move |ctx| Box::pin(f(ctx)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    /// Only reachable through [`Router::dispatch`] directly; `HttpServer`
    /// answers `OPTIONS` preflights itself before routing.
    Options,
    /// Matches every request method.
    Any,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
            Self::Any => "*",
        }
    }

    pub fn matches(&self, request_method: &str) -> bool {
        *self == Self::Any || self.as_str() == request_method
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "DELETE" => Ok(Self::Delete),
            "PATCH" => Ok(Self::Patch),
            "HEAD" => Ok(Self::Head),
            "OPTIONS" => Ok(Self::Options),
            "*" => Ok(Self::Any),
            other => Err(format!("unsupported method: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PathPattern {
    template: String,
    regex: Regex,
    param_names: Vec<String>,
}

impl PathPattern {
    /// `/tools/{toolName}` compiles to `^/tools/([^/]+)$` with `["toolName"]`.
    pub fn compile(template: &str) -> Result<Self, RouterError> {
        let invalid = |reason| RouterError::InvalidPattern {
            pattern: template.to_string(),
            reason,
        };

        if !template.starts_with('/') {
            return Err(invalid("pattern must start with '/'"));
        }

        let mut source = String::with_capacity(template.len() + 8);
        source.push('^');
        let mut param_names = Vec::new();
        let mut rest = template;

        while let Some(open) = rest.find(['{', '}']) {
            if rest[open..].starts_with('}') {
                return Err(invalid("unmatched '}'"));
            }
            source.push_str(&regex::escape(&rest[..open]));

            let after = &rest[open + 1..];
            let close = after.find('}').ok_or_else(|| invalid("unclosed '{'"))?;
            let name = &after[..close];
            if name.is_empty() || name.contains(['{', '/']) {
                return Err(invalid("placeholder names must be non-empty and contain no '{' or '/'"));
            }

            source.push_str("([^/]+)");
            param_names.push(name.to_string());
            rest = &after[close + 1..];
        }
        source.push_str(&regex::escape(rest));
        source.push('$');

        Ok(Self {
            template: template.to_string(),
            regex: Regex::new(&source)?,
            param_names,
        })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn param_names(&self) -> &[String] {
        &self.param_names
    }

    pub fn is_match(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    /// Named captures in declaration order, or `None` when the path does not match.
    pub fn captures(&self, path: &str) -> Option<Vec<(String, String)>> {
        let captures = self.regex.captures(path)?;
        Some(
            self.param_names
                .iter()
                .enumerate()
                .filter_map(|(index, name)| {
                    captures
                        .get(index + 1)
                        .map(|value| (name.clone(), value.as_str().to_string()))
                })
                .collect(),
        )
    }
}

struct Route {
    method: Method,
    pattern: PathPattern,
    handler: Handler,
}

/// A request as read off the wire, before routing.
#[derive(Debug, Clone, Default)]
pub struct RawRequest {
    pub method: String,
    pub path: String,
    pub query: String,
    pub headers: HashMap<String, String>,
    pub body: String,
}

#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_route<F, Fut>(
        &mut self,
        method: Method,
        pattern: &str,
        f: F,
    ) -> Result<&mut Self, RouterError>
    where
        F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.add_handler(method, pattern, handler(f))
    }

    pub fn add_handler(
        &mut self,
        method: Method,
        pattern: &str,
        handler: Handler,
    ) -> Result<&mut Self, RouterError> {
        let pattern = PathPattern::compile(pattern)?;
        debug!(method = %method, pattern = %pattern.template(), "route registered");
        self.routes.push(Route {
            method,
            pattern,
            handler,
        });
        Ok(self)
    }

    pub fn get<F, Fut>(&mut self, pattern: &str, f: F) -> Result<&mut Self, RouterError>
    where
        F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.add_route(Method::Get, pattern, f)
    }

    pub fn post<F, Fut>(&mut self, pattern: &str, f: F) -> Result<&mut Self, RouterError>
    where
        F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.add_route(Method::Post, pattern, f)
    }

    pub fn put<F, Fut>(&mut self, pattern: &str, f: F) -> Result<&mut Self, RouterError>
    where
        F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.add_route(Method::Put, pattern, f)
    }

    pub fn delete<F, Fut>(&mut self, pattern: &str, f: F) -> Result<&mut Self, RouterError>
    where
        F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.add_route(Method::Delete, pattern, f)
    }

    pub fn any<F, Fut>(&mut self, pattern: &str, f: F) -> Result<&mut Self, RouterError>
    where
        F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.add_route(Method::Any, pattern, f)
    }

    pub fn routes(&self) -> Vec<(Method, &str)> {
        self.routes
            .iter()
            .map(|route| (route.method, route.pattern.template()))
            .collect()
    }

    pub async fn dispatch(&self, request: RawRequest) -> RouteResult {
        let matched = self.routes.iter().find_map(|route| {
            if !route.method.matches(&request.method) {
                return None;
            }
            route
                .pattern
                .captures(&request.path)
                .map(|params| (route, params))
        });

        let Some((route, path_params)) = matched else {
            return self.unmatched(&request.method, &request.path);
        };

        let path_params = path_params
            .into_iter()
            .map(|(name, value)| {
                let decoded = urlencoding::decode(&value)
                    .map(|decoded| decoded.into_owned())
                    .unwrap_or_else(|_| value.clone());
                (name, decoded)
            })
            .collect();

        let ctx = RequestContext {
            method: request.method,
            path: request.path,
            path_params,
            query: query::decode(&request.query),
            headers: request.headers,
            body: request.body,
        };
        let method = ctx.method.clone();
        let path = ctx.path.clone();

        // own task so a panicking handler surfaces as a JoinError
        match tokio::spawn((route.handler)(ctx)).await {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => {
                error!(method = %method, path = %path, error = %err, "route handler failed");
                RouteResult::internal_error(&err.to_string())
            }
            Err(join_err) => {
                let message = if join_err.is_panic() {
                    panic_message(join_err.into_panic().as_ref())
                } else {
                    "handler task was cancelled".to_string()
                };
                error!(method = %method, path = %path, error = %message, "route handler panicked");
                RouteResult::internal_error(&message)
            }
        }
    }

    fn unmatched(&self, method: &str, path: &str) -> RouteResult {
        let path_known = self
            .routes
            .iter()
            .any(|route| route.pattern.is_match(path));

        if path_known {
            RouteResult::bad_request(&format!("Method {method} not allowed for {path}"))
        } else {
            RouteResult::not_found(&format!("No route found for {method} {path}"))
        }
    }
}
