//! Pipeline compiler
//!
//! Turns a decoded pipeline into an executable tree of list, filter and
//! container nodes, rewriting each step through an ordered rule set.

pub mod errors;
pub mod image;
pub mod node;
pub mod rules;
pub mod tree;

pub use errors::CompileError;
pub use node::{ContainerNode, FilterNode, ListNode, Node, Tree};
pub use rules::{
    CacheMount, DEFAULT_CACHE_ROOT, DefaultNotifyFilter, Escalate, HttpProxy, ImageName,
    ImagePull, ImageWhitelist, Rule, RuleOptions, RuleSet, Sanitize, StepLint, escalate,
};
pub use tree::compile;
