//! Table calculations: expressions over the aggregated result columns.
//!
//! A calculation can reference a selected field (`${table.field}`), a
//! selected custom dimension (`${id}`), another calculation (`${name}`) or a
//! parameter. Fields resolve to their quoted column alias; calculations are
//! inlined, since sibling aliases are not visible within one `SELECT`.

use std::collections::HashMap;

use indexmap::{IndexMap, IndexSet};

use super::references::{parse_token, render_parameter, tokens, Token};
use crate::error::{CompileError, CompileResult};
use crate::query::{Parameters, TableCalculation};
use crate::sql::SqlDialect;

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledTableCalculation {
    pub name: String,
    pub sql: String,
    pub parameters: IndexSet<String>,
}

/// Compiles calculations against the columns a query selects.
pub struct TableCalculationCompiler<'a> {
    dialect: &'a dyn SqlDialect,
    parameters: &'a Parameters,
    /// Reference key (field id or custom dimension id) → column alias.
    columns: &'a IndexMap<String, String>,
    declared: &'a [TableCalculation],
    calculations: HashMap<&'a str, &'a TableCalculation>,
    compiled: HashMap<String, CompiledTableCalculation>,
    stack: Vec<String>,
}

impl<'a> TableCalculationCompiler<'a> {
    pub fn new(
        dialect: &'a dyn SqlDialect,
        parameters: &'a Parameters,
        columns: &'a IndexMap<String, String>,
        calculations: &'a [TableCalculation],
    ) -> Self {
        Self {
            dialect,
            parameters,
            columns,
            declared: calculations,
            calculations: calculations.iter().map(|c| (c.name.as_str(), c)).collect(),
            compiled: HashMap::new(),
            stack: vec![],
        }
    }

    /// Compile every calculation, in declaration order.
    pub fn compile_all(mut self) -> CompileResult<Vec<CompiledTableCalculation>> {
        let declared = self.declared;
        declared
            .iter()
            .map(|c| self.compile(&c.name))
            .collect()
    }

    pub fn compile(&mut self, name: &str) -> CompileResult<CompiledTableCalculation> {
        if let Some(hit) = self.compiled.get(name) {
            return Ok(hit.clone());
        }
        if let Some(pos) = self.stack.iter().position(|s| s == name) {
            let mut cycle = self.stack[pos..].to_vec();
            cycle.push(name.to_string());
            return Err(CompileError::CyclicReference(cycle));
        }
        let calculation = *self
            .calculations
            .get(name)
            .ok_or_else(|| CompileError::UnresolvedReference(name.to_string()))?;

        self.stack.push(name.to_string());
        let result = self.expand(calculation);
        self.stack.pop();

        let compiled = result?;
        self.compiled.insert(name.to_string(), compiled.clone());
        Ok(compiled)
    }

    fn expand(&mut self, calculation: &'a TableCalculation) -> CompileResult<CompiledTableCalculation> {
        let template = calculation.sql.as_str();
        let mut sql = String::new();
        let mut parameters = IndexSet::new();
        let mut last = 0;

        for (range, body) in tokens(template) {
            sql.push_str(&template[last..range.start]);
            last = range.end;

            match parse_token(body)? {
                Token::Parameter(name) => {
                    let value = self
                        .parameters
                        .get(name)
                        .ok_or_else(|| CompileError::ParameterSubstitution(name.to_string()))?;
                    sql.push_str(&render_parameter(self.dialect, name, value)?);
                    parameters.insert(name.to_string());
                }
                Token::Field { .. } => {
                    if let Some(alias) = self.columns.get(body) {
                        sql.push_str(&self.dialect.quote_identifier(alias));
                    } else if self.calculations.contains_key(body) {
                        let inner = self.compile(body)?;
                        sql.push('(');
                        sql.push_str(&inner.sql);
                        sql.push(')');
                        parameters.extend(inner.parameters);
                    } else {
                        return Err(CompileError::UnresolvedReference(body.to_string()));
                    }
                }
                _ => return Err(CompileError::UnresolvedReference(body.to_string())),
            }
        }
        sql.push_str(&template[last..]);

        Ok(CompiledTableCalculation {
            name: calculation.name.clone(),
            sql,
            parameters,
        })
    }
}
