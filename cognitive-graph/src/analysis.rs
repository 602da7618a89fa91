//! Code analysis ingestion
//!
//! A symbol extractor produces one [`CodeAnalysis`] per source file. Ingesting
//! it creates a `code` node for the file, an `entity` node per symbol linked
//! with `contains`, and an `entity` node per dependency target linked with
//! `depends_on`. Dependency targets are shared across files: a target that
//! already exists as a dependency entity is reused.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::graph::KnowledgeGraph;
use crate::node::{EdgeType, Metadata, NewNode, NodeId, NodeKind};

/// Weight of file -> symbol edges
pub const CONTAINS_WEIGHT: f32 = 1.0;
/// Weight of file/symbol -> dependency edges
pub const DEPENDS_ON_WEIGHT: f32 = 0.7;

const DEPENDENCY_ENTITY: &str = "dependency";

/// Position of a symbol in its file (1-based line)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub line: u32,
    #[serde(default)]
    pub column: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeSymbol {
    pub name: String,
    /// function, class, struct, ...
    pub kind: String,
    #[serde(default)]
    pub location: SourceLocation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dependency {
    /// Symbol or module that depends on `target`
    pub source: String,
    pub target: String,
    /// import, call, extends, ...
    #[serde(alias = "relationKind")]
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternMatch {
    pub name: String,
    pub count: u32,
}

/// Extractor output for a single file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeAnalysis {
    pub file_path: String,
    pub language: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub symbols: Vec<CodeSymbol>,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
    #[serde(default)]
    pub complexity: u32,
    #[serde(default)]
    pub patterns: Vec<PatternMatch>,
}

/// Outcome of ingesting one [`CodeAnalysis`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    pub file_node: NodeId,
    pub symbol_nodes: usize,
    pub dependency_nodes: usize,
    pub edges: usize,
    /// Edges not created because an endpoint was pruned mid-ingest
    pub skipped_edges: usize,
}

impl KnowledgeGraph {
    /// Add the nodes and edges described by a file analysis
    pub fn ingest_code_analysis(&mut self, analysis: &CodeAnalysis) -> IngestReport {
        self.ingest_code_analysis_at(analysis, Utc::now())
    }

    pub(crate) fn ingest_code_analysis_at(
        &mut self,
        analysis: &CodeAnalysis,
        now: DateTime<Utc>,
    ) -> IngestReport {
        let patterns: BTreeMap<&str, u32> = analysis
            .patterns
            .iter()
            .map(|p| (p.name.as_str(), p.count))
            .collect();

        let file = NewNode::new(NodeKind::Code, analysis.file_path.as_str())
            .content(analysis.content.as_str())
            .meta("filePath", analysis.file_path.as_str())
            .meta("language", analysis.language.as_str())
            .meta("complexity", analysis.complexity)
            .meta("patterns", json!(patterns));
        let file_node = self.add_node_at(file, now).id;

        let mut report = IngestReport {
            file_node,
            symbol_nodes: 0,
            dependency_nodes: 0,
            edges: 0,
            skipped_edges: 0,
        };

        let mut symbols: HashMap<&str, NodeId> = HashMap::new();
        for symbol in &analysis.symbols {
            let mut new = NewNode::new(NodeKind::Entity, symbol.name.as_str())
                .content(symbol.signature.clone().unwrap_or_default())
                .meta("entityType", symbol.kind.as_str())
                .meta("filePath", analysis.file_path.as_str())
                .meta(
                    "location",
                    json!({ "line": symbol.location.line, "column": symbol.location.column }),
                );
            if let Some(signature) = &symbol.signature {
                new = new.meta("signature", signature.as_str());
            }

            let id = self.add_node_at(new, now).id;
            report.symbol_nodes += 1;
            symbols.entry(symbol.name.as_str()).or_insert(id);

            self.link(
                &mut report,
                file_node,
                id,
                EdgeType::Contains,
                CONTAINS_WEIGHT,
                Metadata::new(),
                now,
            );
        }

        let mut targets: HashMap<&str, NodeId> = HashMap::new();
        for dep in &analysis.dependencies {
            let target = match targets.get(dep.target.as_str()) {
                Some(id) => *id,
                None => {
                    let id = match self.find_dependency_entity(&dep.target) {
                        Some(id) => id,
                        None => {
                            let new = NewNode::new(NodeKind::Entity, dep.target.as_str())
                                .meta("entityType", DEPENDENCY_ENTITY);
                            report.dependency_nodes += 1;
                            self.add_node_at(new, now).id
                        }
                    };
                    targets.insert(dep.target.as_str(), id);
                    id
                }
            };

            let source = symbols
                .get(dep.source.as_str())
                .copied()
                .unwrap_or(file_node);

            let mut metadata = Metadata::new();
            metadata.insert("relationKind".to_string(), json!(dep.kind));
            self.link(
                &mut report,
                source,
                target,
                EdgeType::DependsOn,
                DEPENDS_ON_WEIGHT,
                metadata,
                now,
            );
        }

        log::info!(
            "Ingested {}: {} symbols, {} new dependencies, {} edges",
            analysis.file_path,
            report.symbol_nodes,
            report.dependency_nodes,
            report.edges
        );

        report
    }

    #[allow(clippy::too_many_arguments)]
    fn link(
        &mut self,
        report: &mut IngestReport,
        source: NodeId,
        target: NodeId,
        edge_type: EdgeType,
        weight: f32,
        metadata: Metadata,
        now: DateTime<Utc>,
    ) {
        match self.add_edge_at(source, target, edge_type, weight, metadata, now) {
            Ok(_) => report.edges += 1,
            Err(e) => {
                log::warn!("Skipping {} edge during ingest: {}", edge_type, e);
                report.skipped_edges += 1;
            }
        }
    }

    fn find_dependency_entity(&self, name: &str) -> Option<NodeId> {
        self.nodes_of_kind(NodeKind::Entity)
            .into_iter()
            .find(|n| {
                n.name == name
                    && n.metadata.get("entityType").and_then(|v| v.as_str())
                        == Some(DEPENDENCY_ENTITY)
            })
            .map(|n| n.id)
    }
}
