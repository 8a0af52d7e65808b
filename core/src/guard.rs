//! Navigation guard driven by the authentication state.
//!
//! Routes are matched in registration order. Redirect routes are followed
//! first, then the access rule of the destination applies: signed-in users
//! are sent away from guest-only pages, anonymous users away from protected
//! ones. Unknown paths are allowed.

/// Who may open a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    RequiresAuth,
    RequiresGuest,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    Allow,
    Redirect(String),
}

#[derive(Debug, Clone)]
enum Target {
    Access(Access),
    Redirect(String),
}

#[derive(Debug, Clone)]
struct Route {
    pattern: Vec<String>,
    target: Target,
}

impl Route {
    fn new(pattern: &str, target: Target) -> Self {
        Self {
            pattern: segments(pattern).map(str::to_string).collect(),
            target,
        }
    }

    /// `:name` segments match any single segment.
    fn matches(&self, path: &str) -> bool {
        let mut parts = segments(path);
        for expected in &self.pattern {
            match parts.next() {
                Some(part) if expected.starts_with(':') || part == expected.as_str() => {}
                _ => return false,
            }
        }
        parts.next().is_none()
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

/// Redirect chains longer than this are treated as a loop and stop.
const MAX_REDIRECTS: usize = 8;

#[derive(Debug, Clone)]
pub struct RouteGuard {
    routes: Vec<Route>,
    login_path: String,
    home_path: String,
}

impl RouteGuard {
    /// An empty guard. Anonymous users are sent to `login_path`, signed-in
    /// users leaving a guest page to `home_path`.
    pub fn new(login_path: &str, home_path: &str) -> Self {
        Self {
            routes: Vec::new(),
            login_path: login_path.to_string(),
            home_path: home_path.to_string(),
        }
    }

    pub fn route(mut self, pattern: &str, access: Access) -> Self {
        self.routes.push(Route::new(pattern, Target::Access(access)));
        self
    }

    pub fn redirect(mut self, from: &str, to: &str) -> Self {
        self.routes.push(Route::new(from, Target::Redirect(to.to_string())));
        self
    }

    /// Decide where navigation to `path` ends up.
    pub fn check(&self, path: &str, authenticated: bool) -> Navigation {
        let requested = strip_query(path);
        let mut current = requested.to_string();

        let mut hops = 0;
        loop {
            let next = match self.lookup(&current) {
                Some(Target::Redirect(to)) => to.clone(),
                Some(Target::Access(Access::RequiresGuest)) if authenticated => self.home_path.clone(),
                Some(Target::Access(Access::RequiresAuth)) if !authenticated => self.login_path.clone(),
                _ => break,
            };
            if next == current {
                break;
            }
            if hops == MAX_REDIRECTS {
                // A chain that never settles is a loop; never let it grant access.
                return Navigation::Redirect(self.login_path.clone());
            }
            hops += 1;
            current = next;
        }

        if current == requested {
            Navigation::Allow
        } else {
            Navigation::Redirect(current)
        }
    }

    fn lookup(&self, path: &str) -> Option<&Target> {
        self.routes
            .iter()
            .find(|route| route.matches(path))
            .map(|route| &route.target)
    }
}

impl Default for RouteGuard {
    /// The application's route table.
    fn default() -> Self {
        RouteGuard::new("/login", "/dashboard")
            .redirect("/", "/login")
            .route("/login", Access::RequiresGuest)
            .route("/dashboard", Access::RequiresAuth)
            .route("/profile", Access::RequiresAuth)
            .route("/posts/create", Access::RequiresAuth)
            .route("/posts", Access::RequiresAuth)
            .route("/docs", Access::RequiresAuth)
            .route("/docs/:slug", Access::RequiresAuth)
    }
}

fn strip_query(path: &str) -> &str {
    path.split(['?', '#']).next().unwrap_or(path)
}
