//! Rule: options block entries are recognized and well-formed

use crate::ast::{OptionValue, Program};
use crate::parser::named_constant;
use crate::resolver::{CompileProblem, ResolveRule, RoleSet};

pub struct OptionsRule;

const ID: &str = "options";

impl ResolveRule for OptionsRule {
    fn id(&self) -> &'static str {
        ID
    }

    fn description(&self) -> &'static str {
        "Only known options are accepted, with a numeric or constant value"
    }

    fn check(&self, program: &Program, _roles: &RoleSet) -> Vec<CompileProblem> {
        let mut problems = Vec::new();
        let mut seen_outside = false;

        for opt in &program.options {
            if opt.name != "outside" {
                problems.push(CompileProblem::error(
                    opt.span,
                    format!("Unknown option: {}", opt.name),
                    ID,
                ));
                continue;
            }

            if seen_outside {
                problems.push(CompileProblem::error(
                    opt.span,
                    "Option 'outside' given more than once".to_string(),
                    ID,
                ));
            }
            seen_outside = true;

            if let OptionValue::Name { name } = &opt.value {
                if named_constant(name).is_none() {
                    problems.push(CompileProblem::error(
                        opt.span,
                        format!("Invalid value for option outside: {}", name),
                        ID,
                    ));
                }
            }
        }

        problems
    }
}
