use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Route {
    Home,
    Upload,
    Chat,
    Diagnostic,
}

/// Navigation order of the header.
pub const NAV_ROUTES: [Route; 4] = [Route::Home, Route::Upload, Route::Chat, Route::Diagnostic];

impl Route {
    pub fn path(&self) -> &'static str {
        match self {
            Route::Home => "/",
            Route::Upload => "/upload",
            Route::Chat => "/chat",
            Route::Diagnostic => "/diagnostic",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Route::Home => "Accueil",
            Route::Upload => "Documentation",
            Route::Chat => "Chat",
            Route::Diagnostic => "Diagnostic",
        }
    }

    /// Resolves a path or a navigation label. Anything unknown lands on Home.
    pub fn resolve(input: &str) -> Route {
        let trimmed = input.trim();
        let normalized = trimmed.trim_end_matches('/');
        let normalized = if normalized.is_empty() { "/" } else { normalized };
        NAV_ROUTES
            .iter()
            .copied()
            .find(|route| {
                route.path() == normalized
                    || route.path().trim_start_matches('/') == normalized
                    || route.label().eq_ignore_ascii_case(trimmed)
            })
            .unwrap_or(Route::Home)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavItem {
    pub route: Route,
    pub label: &'static str,
    pub active: bool,
}

pub fn navigation(active: Route) -> Vec<NavItem> {
    NAV_ROUTES
        .iter()
        .map(|route| NavItem {
            route: *route,
            label: route.label(),
            active: *route == active,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_paths_and_labels() {
        assert_eq!(Route::resolve("/chat"), Route::Chat);
        assert_eq!(Route::resolve("/upload/"), Route::Upload);
        assert_eq!(Route::resolve("diagnostic"), Route::Diagnostic);
        assert_eq!(Route::resolve("Documentation"), Route::Upload);
        assert_eq!(Route::resolve("/"), Route::Home);
        assert_eq!(Route::resolve("/settings"), Route::Home);
    }

    #[test]
    fn test_navigation_marks_single_active_route() {
        let items = navigation(Route::Chat);
        assert_eq!(items.len(), 4);
        assert_eq!(items.iter().filter(|item| item.active).count(), 1);
        assert_eq!(items[0].label, "Accueil");
        assert!(items[2].active);
    }
}
