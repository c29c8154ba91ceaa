//! The Reed IR pass pipeline.
//!
//! A [`visitor::PassManager`] walks the IR in pre-order and hands each node
//! to every registered [`visitor::Pass`] in registration order; a pass may
//! keep, replace, or (where the parent slot allows it) delete the node. The
//! pipeline front door is [`Pipeline`], which wires up the standard
//! analysis passes and, optionally, the optimizing transforms.

pub mod analysis;
pub mod transform;
pub mod visitor;

use reed_common::diag::Diagnostic;
use reed_common::span::SourceName;
use reed_parser::ir::Module;
use tracing::debug;

use crate::analysis::expression::ExpressionAnalyzer;
use crate::analysis::function::FunctionAnalyzer;
use crate::analysis::method::MethodAnalyzer;
use crate::transform::dce::{DeadBranchElimination, DeadCodeElimination};
use crate::transform::fold::ConstantFolding;
use crate::visitor::{Pass, PassManager};

/// An ordered pass pipeline over one module.
pub struct Pipeline {
    pm: PassManager,
}

impl Pipeline {
    /// The standard semantic-analysis pipeline: method analysis, function
    /// analysis, expression analysis.
    pub fn new(source: SourceName) -> Self {
        let mut pipeline = Self::empty(source);
        pipeline.add_pass(Box::new(MethodAnalyzer::new()));
        pipeline.add_pass(Box::new(FunctionAnalyzer::new()));
        pipeline.add_pass(Box::new(ExpressionAnalyzer::new()));
        pipeline
    }

    /// The standard pipeline plus the optimizing transforms.
    pub fn with_transforms(source: SourceName) -> Self {
        let mut pipeline = Self::new(source);
        pipeline.add_pass(Box::new(ConstantFolding::new()));
        pipeline.add_pass(Box::new(DeadCodeElimination::new()));
        pipeline.add_pass(Box::new(DeadBranchElimination::new()));
        pipeline
    }

    /// A pipeline with no passes registered; add them with
    /// [`Pipeline::add_pass`].
    pub fn empty(source: SourceName) -> Self {
        Self {
            pm: PassManager::new(source),
        }
    }

    /// Register a pass. Passes run in registration order on each node.
    pub fn add_pass(&mut self, pass: Box<dyn Pass>) {
        debug!(pass = pass.name(), "registering pass");
        self.pm.add_pass(pass);
    }

    /// Run every registered pass over the module.
    ///
    /// The first semantic error aborts the run for this module and is
    /// returned; the module may be partially rewritten at that point.
    pub fn run(&mut self, module: &mut Module) -> Result<(), Diagnostic> {
        debug!(module = %module.name, "running pass pipeline");
        self.pm.run(module)
    }
}
