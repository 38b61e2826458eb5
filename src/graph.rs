//! topic browser over a fixed fixture. no storage, no edges, no queries.

use bevy::prelude::*;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TopicCategory {
    Concept,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TopicNode {
    pub id: u32,
    pub label: &'static str,
    pub category: TopicCategory,
    /// connection count shown on the card.
    pub degree: u32,
}

const fn concept(id: u32, label: &'static str, degree: u32) -> TopicNode {
    TopicNode { id, label, category: TopicCategory::Concept, degree }
}

pub static TOPIC_NODES: [TopicNode; 8] = [
    concept(1, "Artificial Intelligence", 5),
    concept(2, "Machine Learning", 8),
    concept(3, "Deep Learning", 6),
    concept(4, "Neural Networks", 4),
    concept(5, "Natural Language Processing", 7),
    concept(6, "Computer Vision", 3),
    concept(7, "Reinforcement Learning", 5),
    concept(8, "Data Science", 9),
];

/// case-insensitive substring match on the label, original order kept.
pub fn filter<'a>(nodes: &'a [TopicNode], term: &str) -> Vec<&'a TopicNode> {
    let needle = term.to_lowercase();
    nodes
        .iter()
        .filter(|n| n.label.to_lowercase().contains(&needle))
        .collect()
}

/// pretty json of the given nodes, for the export action.
pub fn export_json(nodes: &[&TopicNode]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(nodes)
}

/// graph page state. `visible` only changes on [`GraphBrowser::refresh`],
/// so typing into the search box doesn't reflow the cards.
#[derive(Resource, Debug, Clone)]
pub struct GraphBrowser {
    pub search_term: String,
    visible: Vec<u32>,
    selected: Option<u32>,
}

impl Default for GraphBrowser {
    fn default() -> Self {
        Self {
            search_term: String::new(),
            visible: TOPIC_NODES.iter().map(|n| n.id).collect(),
            selected: None,
        }
    }
}

impl GraphBrowser {
    pub fn refresh(&mut self) {
        self.visible = filter(&TOPIC_NODES, &self.search_term).into_iter().map(|n| n.id).collect();
        debug!(target: "deepbot", "graph refresh: term='{}' visible={}", self.search_term, self.visible.len());
    }

    pub fn visible(&self) -> Vec<&'static TopicNode> {
        TOPIC_NODES.iter().filter(|n| self.visible.contains(&n.id)).collect()
    }

    /// display-only selection; unknown ids are ignored.
    pub fn select(&mut self, id: u32) -> Option<&'static TopicNode> {
        let node = TOPIC_NODES.iter().find(|n| n.id == id)?;
        self.selected = Some(id);
        Some(node)
    }

    pub fn selected(&self) -> Option<&'static TopicNode> {
        self.selected.and_then(|id| TOPIC_NODES.iter().find(|n| n.id == id))
    }

    pub fn export(&self) -> Result<String, serde_json::Error> {
        export_json(&self.visible())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn learning_matches_three_in_order() {
        let hits: Vec<_> = filter(&TOPIC_NODES, "Learning").iter().map(|n| n.label).collect();
        assert_eq!(hits, vec!["Machine Learning", "Deep Learning", "Reinforcement Learning"]);
    }

    #[test]
    fn match_ignores_case() {
        let hits: Vec<_> = filter(&TOPIC_NODES, "nEuRaL").iter().map(|n| n.id).collect();
        assert_eq!(hits, vec![4]);
        assert!(filter(&TOPIC_NODES, "graph database").is_empty());
    }

    #[test]
    fn empty_term_returns_everything() {
        let all: Vec<TopicNode> = filter(&TOPIC_NODES, "").into_iter().copied().collect();
        assert_eq!(all, TOPIC_NODES.to_vec());
    }

    #[test]
    fn browser_refresh_and_select() {
        let mut b = GraphBrowser::default();
        assert_eq!(b.visible().len(), 8);

        b.search_term = "science".into();
        assert_eq!(b.visible().len(), 8, "typing alone does not refilter");
        b.refresh();
        assert_eq!(b.visible().iter().map(|n| n.id).collect::<Vec<_>>(), vec![8]);

        assert!(b.select(99).is_none());
        assert!(b.selected().is_none());
        assert_eq!(b.select(3).map(|n| n.label), Some("Deep Learning"));
        assert_eq!(b.selected().map(|n| n.degree), Some(6));
    }

    #[test]
    fn export_lists_visible_nodes() {
        let mut b = GraphBrowser::default();
        b.search_term = "vision".into();
        b.refresh();
        let v: serde_json::Value = serde_json::from_str(&b.export().expect("export")).expect("json");
        assert_eq!(
            v,
            serde_json::json!([{ "id": 6, "label": "Computer Vision", "category": "concept", "degree": 3 }])
        );
    }
}
