//! Pages under the worker's control.

use hashbrown::HashMap;
use url::Url;

/// An open page the worker may control.
#[derive(Debug, Clone)]
pub struct Client {
    /// Client ID.
    pub id: String,

    /// Page URL.
    pub url: Url,

    /// Whether this worker controls the page.
    pub controlled: bool,
}

/// Registry of the open pages the worker may claim.
#[derive(Debug, Default)]
pub struct Clients {
    clients: HashMap<String, Client>,
    next_id: u64,
}

impl Clients {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an open page. Returns its assigned ID.
    pub fn add(&mut self, url: Url) -> String {
        self.next_id += 1;
        let id = format!("client-{}", self.next_id);
        self.clients.insert(
            id.clone(),
            Client {
                id: id.clone(),
                url,
                controlled: false,
            },
        );
        id
    }

    /// Remove a page.
    pub fn remove(&mut self, id: &str) -> Option<Client> {
        self.clients.remove(id)
    }

    /// Get a page by ID.
    pub fn get(&self, id: &str) -> Option<&Client> {
        self.clients.get(id)
    }

    /// Take control of every open page immediately. Returns how many pages
    /// are now controlled.
    pub fn claim(&mut self) -> usize {
        for client in self.clients.values_mut() {
            client.controlled = true;
        }
        self.clients.len()
    }

    /// Number of controlled pages.
    pub fn controlled_count(&self) -> usize {
        self.clients.values().filter(|c| c.controlled).count()
    }

    /// Number of open pages.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether no pages are open.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_claim() {
        let mut clients = Clients::new();
        let id = clients.add(Url::parse("https://app.example/").unwrap());
        clients.add(Url::parse("https://app.example/#settings").unwrap());

        assert_eq!(clients.len(), 2);
        assert_eq!(clients.controlled_count(), 0);
        assert!(!clients.get(&id).unwrap().controlled);

        assert_eq!(clients.claim(), 2);
        assert_eq!(clients.controlled_count(), 2);
        assert!(clients.get(&id).unwrap().controlled);
    }

    #[test]
    fn test_remove() {
        let mut clients = Clients::new();
        let id = clients.add(Url::parse("https://app.example/").unwrap());

        assert!(clients.remove(&id).is_some());
        assert!(clients.remove(&id).is_none());
        assert!(clients.is_empty());
    }
}
