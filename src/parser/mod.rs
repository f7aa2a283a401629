//! Parser module for JavaScript/TypeScript test files

pub mod ast_helpers;
pub mod typescript;

pub use ast_helpers::{
    argument_nodes, body_statements, call_arguments, function_parameters, is_function_literal,
    line_indent, node_text, node_to_location, parameter_name, registration_callee,
    string_literal_value, unwrap_parens, visit_named, HOOK_NAMES, SUITE_NAMES, TEST_CASE_NAMES,
};
pub use typescript::{first_syntax_error, Grammar, TypeScriptParser};
