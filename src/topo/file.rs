//! 拓扑描述文件
//!
//! 文本格式，每行一条声明（空行与 `#` 开头的注释行跳过）：
//!
//! ```text
//! host   <name> <id>
//! router <name> <id>
//! link   <nameA> <nameB> <queueBytes> <bandwidthBps> <latencyMicros>
//! ```
//!
//! `link` 在两个节点之间建立一对参数相同的单向链路。
//! 同一结构也可以用 JSON 描述（[`TopologySpec::from_json`]）。

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::net::{Network, NodeKind};
use crate::sim::SimTime;

#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("line {line}: {msg}")]
    Parse { line: usize, msg: String },
    #[error("line {line}: unknown node `{name}`")]
    UnknownNode { line: usize, name: String },
    #[error("duplicate node {what} `{value}`")]
    Duplicate { what: &'static str, value: String },
    #[error("link connects `{0}` to itself")]
    SelfLink(String),
    #[error("invalid JSON topology: {0}")]
    Json(#[from] serde_json::Error),
    #[error("cannot read topology file: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub name: String,
    pub id: u16,
    pub kind: NodeKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkSpec {
    pub a: String,
    pub b: String,
    pub queue_bytes: u64,
    pub bandwidth_bps: u64,
    pub latency_us: u64,
}

/// 完整的拓扑描述
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologySpec {
    pub nodes: Vec<NodeSpec>,
    pub links: Vec<LinkSpec>,
}

impl TopologySpec {
    pub fn from_json(s: &str) -> Result<Self, TopologyError> {
        let spec: TopologySpec = serde_json::from_str(s)?;
        spec.validate()?;
        Ok(spec)
    }

    pub fn to_json(&self) -> Result<String, TopologyError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// 名称与 ID 唯一，链路端点存在且不自环
    pub fn validate(&self) -> Result<(), TopologyError> {
        let mut names = HashSet::new();
        let mut ids = HashSet::new();
        for n in &self.nodes {
            if !names.insert(n.name.as_str()) {
                return Err(TopologyError::Duplicate {
                    what: "name",
                    value: n.name.clone(),
                });
            }
            if !ids.insert(n.id) {
                return Err(TopologyError::Duplicate {
                    what: "id",
                    value: n.id.to_string(),
                });
            }
        }
        for (i, l) in self.links.iter().enumerate() {
            for name in [&l.a, &l.b] {
                if !names.contains(name.as_str()) {
                    return Err(TopologyError::UnknownNode {
                        line: i + 1,
                        name: name.clone(),
                    });
                }
            }
            if l.a == l.b {
                return Err(TopologyError::SelfLink(l.a.clone()));
            }
        }
        Ok(())
    }

    /// 构建网络并建好路由表
    pub fn build_network(&self) -> Network {
        let mut net = Network::default();
        let mut ids = HashMap::new();
        for n in &self.nodes {
            let id = match n.kind {
                NodeKind::Host => net.add_host(n.name.clone(), n.id),
                NodeKind::Router => net.add_router(n.name.clone(), n.id),
            };
            ids.insert(n.name.as_str(), id);
        }
        for l in &self.links {
            let (Some(&a), Some(&b)) = (ids.get(l.a.as_str()), ids.get(l.b.as_str())) else {
                continue;
            };
            net.connect_duplex(
                a,
                b,
                SimTime::from_micros(l.latency_us),
                l.bandwidth_bps,
                l.queue_bytes,
            );
        }
        net.build_routing_tables();
        info!(
            nodes = self.nodes.len(),
            links = self.links.len(),
            "🗺️ 拓扑构建完成"
        );
        net
    }
}

/// 解析文本拓扑描述
pub fn parse_topology(text: &str) -> Result<TopologySpec, TopologyError> {
    let mut spec = TopologySpec::default();
    let mut names: HashMap<String, u16> = HashMap::new();

    for (i, raw) in text.lines().enumerate() {
        let line = i + 1;
        let content = raw.trim();
        if content.is_empty() || content.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = content.split_whitespace().collect();
        match fields[0] {
            kw @ ("host" | "router") => {
                let [_, name, id] = fields[..] else {
                    return Err(parse_err(line, format!("`{kw}` expects <name> <id>")));
                };
                let id: u16 = parse_num(line, "id", id)?;
                if names.contains_key(name) {
                    return Err(TopologyError::Duplicate {
                        what: "name",
                        value: name.to_string(),
                    });
                }
                if names.values().any(|&v| v == id) {
                    return Err(TopologyError::Duplicate {
                        what: "id",
                        value: id.to_string(),
                    });
                }
                names.insert(name.to_string(), id);
                let kind = if kw == "host" {
                    NodeKind::Host
                } else {
                    NodeKind::Router
                };
                spec.nodes.push(NodeSpec {
                    name: name.to_string(),
                    id,
                    kind,
                });
            }
            "link" => {
                let [_, a, b, queue, bw, lat] = fields[..] else {
                    return Err(parse_err(
                        line,
                        "`link` expects <a> <b> <queueBytes> <bandwidthBps> <latencyMicros>".into(),
                    ));
                };
                for name in [a, b] {
                    if !names.contains_key(name) {
                        return Err(TopologyError::UnknownNode {
                            line,
                            name: name.to_string(),
                        });
                    }
                }
                if a == b {
                    return Err(TopologyError::SelfLink(a.to_string()));
                }
                spec.links.push(LinkSpec {
                    a: a.to_string(),
                    b: b.to_string(),
                    queue_bytes: parse_num(line, "queueBytes", queue)?,
                    bandwidth_bps: parse_num(line, "bandwidthBps", bw)?,
                    latency_us: parse_num(line, "latencyMicros", lat)?,
                });
            }
            other => return Err(parse_err(line, format!("unknown directive `{other}`"))),
        }
    }
    debug!(nodes = spec.nodes.len(), links = spec.links.len(), "拓扑文件解析完成");
    Ok(spec)
}

/// 读取拓扑文件；`.json` 后缀按 JSON 解析，其余按文本格式。
pub fn load_topology(path: &Path) -> Result<TopologySpec, TopologyError> {
    let text = std::fs::read_to_string(path)?;
    if path.extension().is_some_and(|e| e == "json") {
        TopologySpec::from_json(&text)
    } else {
        parse_topology(&text)
    }
}

fn parse_err(line: usize, msg: String) -> TopologyError {
    TopologyError::Parse { line, msg }
}

fn parse_num<T: std::str::FromStr>(line: usize, field: &str, s: &str) -> Result<T, TopologyError> {
    s.parse()
        .map_err(|_| parse_err(line, format!("{field} `{s}` is not a valid number")))
}
