//! The backend lowers a parsed [`Program`] straight to textual LLVM IR. In
//! this form, loops and conditionals are simplified to labeled basic blocks
//! and branches, and expression trees are flattened into ordered
//! single-assignment instructions over fresh `%t` temporaries.
//!
//! Every runtime value is a `double`; booleans are 0.0/1.0. String literals
//! exist only as indexed program-wide constants consumed by `out`.

use std::fmt::Write;

use hashbrown::HashMap;
use indoc::indoc;
use itertools::Itertools;
use once_cell::sync::Lazy;
use thiserror::Error;

use crate::frontend::ast::{
    BinaryOperatorKind, Expression, ExpressionKind, FunctionDefinition, ModuleName, Program,
    Statement, StatementKind, UnaryOperatorKind,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodegenError {
    #[error("line {line}: unknown variable `{name}`")]
    UnknownVariable { name: String, line: u32 },

    /// Reserved for operators that parse but have no lowering; every
    /// operator in the current grammar lowers, so this does not occur today.
    #[error("line {line}: unknown operator `{operator}`")]
    UnknownOperator { operator: String, line: u32 },

    #[error("line {line}: unknown call `{module} {function}`")]
    UnknownCall {
        module: String,
        function: String,
        line: u32,
    },

    #[error("failed to write IR output")]
    IoFailure(#[from] std::fmt::Error),
}

/// Module declarations emitted ahead of any function: the math intrinsics
/// the `math` module lowers to, the print runtime, and the `printf` format
/// strings `out` uses.
const PREAMBLE: &str = indoc! {r#"
    ; prose compiled module

    declare double @llvm.fabs.f64(double)
    declare double @llvm.sqrt.f64(double)
    declare double @llvm.floor.f64(double)
    declare double @llvm.ceil.f64(double)
    declare double @llvm.sin.f64(double)
    declare double @llvm.cos.f64(double)
    declare double @llvm.pow.f64(double, double)
    declare double @llvm.minnum.f64(double, double)
    declare double @llvm.maxnum.f64(double, double)

    declare i32 @printf(i8*, ...)

    @.fmt_num = private constant [4 x i8] c"%g\0A\00"
    @.fmt_str = private constant [4 x i8] c"%s\0A\00"
    @.fmt_int = private constant [6 x i8] c"%.0f\0A\00"

"#};

struct MathIntrinsic {
    symbol: &'static str,
    arity: usize,
}

static MATH_INTRINSICS: Lazy<HashMap<&'static str, MathIntrinsic>> = Lazy::new(|| {
    HashMap::from([
        ("abs", MathIntrinsic { symbol: "llvm.fabs.f64", arity: 1 }),
        ("sqrt", MathIntrinsic { symbol: "llvm.sqrt.f64", arity: 1 }),
        ("floor", MathIntrinsic { symbol: "llvm.floor.f64", arity: 1 }),
        ("ceil", MathIntrinsic { symbol: "llvm.ceil.f64", arity: 1 }),
        ("sin", MathIntrinsic { symbol: "llvm.sin.f64", arity: 1 }),
        ("cos", MathIntrinsic { symbol: "llvm.cos.f64", arity: 1 }),
        ("min", MathIntrinsic { symbol: "llvm.minnum.f64", arity: 2 }),
        ("max", MathIntrinsic { symbol: "llvm.maxnum.f64", arity: 2 }),
        ("pow", MathIntrinsic { symbol: "llvm.pow.f64", arity: 2 }),
    ])
});

/// Walks the AST and emits the IR text stream. Temp and label counters are
/// function-scoped; the string-literal table and its consumption counter
/// span the whole program so constant indices are independent of function
/// emission order.
#[derive(Debug, Default)]
pub struct CodeGenerator {
    output: String,

    /* Per-function state, reset at every function entry */
    temp_counter: usize,
    label_counter: usize,
    parameters: Vec<String>,
    /// Storage slots in allocation order; the index is the slot number and
    /// `None` marks an anonymous loop counter. Searched linearly, so a name
    /// rebinds to its first slot instead of shadowing it.
    locals: Vec<Option<String>>,

    /* Whole-program state */
    string_literals: Vec<String>,
    strings_emitted: usize,
}

impl CodeGenerator {
    pub fn generate(program: &Program) -> Result<String, CodegenError> {
        let mut generator = Self::default();

        generator.output.push_str(PREAMBLE);

        generator.collect_string_literals(program);
        generator.emit_string_constants()?;

        for function in &program.function_definitions {
            generator.emit_function(function)?;
        }

        Ok(generator.output)
    }

    /* Counters and storage slots */

    fn next_temp(&mut self) -> usize {
        let temp = self.temp_counter;
        self.temp_counter += 1;
        temp
    }

    fn next_label(&mut self) -> usize {
        let label = self.label_counter;
        self.label_counter += 1;
        label
    }

    fn find_local(&self, name: &str) -> Option<usize> {
        self.locals
            .iter()
            .position(|local| local.as_deref() == Some(name))
    }

    fn bind_local(&mut self, name: &str) -> usize {
        self.locals.push(Some(name.to_owned()));
        self.locals.len() - 1
    }

    fn reserve_local(&mut self) -> usize {
        self.locals.push(None);
        self.locals.len() - 1
    }

    fn find_parameter(&self, name: &str) -> Option<usize> {
        self.parameters.iter().position(|p| p == name)
    }

    /* String-literal pre-pass */

    /// Collects every string literal across every function body in a fixed
    /// pre-order traversal before any function is emitted. The table is
    /// positional, not a set: the same text in two places gets two entries,
    /// and `out` consumes indices in the same traversal order.
    fn collect_string_literals(&mut self, program: &Program) {
        for function in &program.function_definitions {
            for statement in &function.body {
                self.collect_statement_strings(statement);
            }
        }
    }

    fn collect_statement_strings(&mut self, statement: &Statement) {
        match &statement.kind {
            StatementKind::Out(value) => self.collect_expression_strings(value),
            StatementKind::Return { value, .. } => self.collect_expression_strings(value),
            StatementKind::Let { value, .. } => self.collect_expression_strings(value),
            StatementKind::Expression(expression) => self.collect_expression_strings(expression),
            StatementKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.collect_expression_strings(condition);

                for statement in then_branch {
                    self.collect_statement_strings(statement);
                }

                for statement in else_branch.iter().flatten() {
                    self.collect_statement_strings(statement);
                }
            }
            StatementKind::Repeat { count, body, .. } => {
                self.collect_expression_strings(count);

                for statement in body {
                    self.collect_statement_strings(statement);
                }
            }
            StatementKind::While { condition, body } => {
                self.collect_expression_strings(condition);

                for statement in body {
                    self.collect_statement_strings(statement);
                }
            }
            StatementKind::Inc { .. } | StatementKind::Dec { .. } => {}
        }
    }

    fn collect_expression_strings(&mut self, expression: &Expression) {
        match &expression.kind {
            ExpressionKind::StringLiteral(text) => self.string_literals.push(text.clone()),
            ExpressionKind::Binary { lhs, rhs, .. } => {
                self.collect_expression_strings(lhs);
                self.collect_expression_strings(rhs);
            }
            ExpressionKind::Unary { operand, .. } => self.collect_expression_strings(operand),
            ExpressionKind::Call { arguments, .. } => {
                for argument in arguments {
                    self.collect_expression_strings(argument);
                }
            }
            _ => {}
        }
    }

    /// One indexed byte-array constant per table entry, NUL-terminated.
    fn emit_string_constants(&mut self) -> Result<(), CodegenError> {
        for index in 0..self.string_literals.len() {
            let literal = self.string_literals[index].clone();
            let encoded = encode_string_constant(&literal);

            writeln!(
                self.output,
                "@.str{index} = private constant [{} x i8] c\"{encoded}\\00\"",
                literal.len() + 1,
            )?;
        }

        if !self.string_literals.is_empty() {
            self.output.push('\n');
        }

        Ok(())
    }

    /* Functions */

    fn emit_function(&mut self, function: &FunctionDefinition) -> Result<(), CodegenError> {
        self.temp_counter = 0;
        self.label_counter = 0;
        self.locals.clear();
        self.parameters = function
            .parameters
            .iter()
            .map(|parameter| parameter.name.clone())
            .collect();

        let arguments = (0..self.parameters.len())
            .map(|index| format!("double %arg{index}"))
            .join(", ");

        writeln!(self.output, "define double @{}({arguments}) {{", function.name)?;
        writeln!(self.output, "entry:")?;

        for statement in &function.body {
            self.emit_statement(statement)?;
        }

        // Every block needs a terminator; a body with no top-level return
        // gets an implicit zero return.
        let has_return = function
            .body
            .iter()
            .any(|statement| matches!(statement.kind, StatementKind::Return { .. }));

        if !has_return {
            writeln!(self.output, "  ret double 0.0")?;
        }

        writeln!(self.output, "}}")?;
        self.output.push('\n');

        Ok(())
    }

    /* Statements */

    fn emit_statement(&mut self, statement: &Statement) -> Result<(), CodegenError> {
        match &statement.kind {
            StatementKind::Return { value, .. } => {
                let value_reg = self.emit_expression(value)?;
                writeln!(self.output, "  ret double %t{value_reg}")?;
            }

            StatementKind::If {
                condition,
                then_branch,
                else_branch,
            } => self.emit_if(condition, then_branch, else_branch.as_deref())?,

            StatementKind::Let { name, value } => {
                let value_reg = self.emit_expression(value)?;

                // Rebinding stores into the existing slot; only a first
                // occurrence allocates
                if let Some(slot) = self.find_local(name) {
                    writeln!(self.output, "  store double %t{value_reg}, double* %local{slot}")?;
                } else {
                    let slot = self.locals.len();
                    writeln!(self.output, "  %local{slot} = alloca double")?;
                    writeln!(self.output, "  store double %t{value_reg}, double* %local{slot}")?;
                    self.bind_local(name);
                }
            }

            StatementKind::Expression(expression) => {
                self.emit_expression(expression)?;
            }

            StatementKind::Repeat {
                count,
                binding,
                body,
            } => self.emit_repeat(count, binding.as_deref(), body)?,

            StatementKind::While { condition, body } => self.emit_while(condition, body)?,

            StatementKind::Inc { name, amount } => {
                self.emit_step(statement.line, name, amount.as_ref(), "fadd")?;
            }

            StatementKind::Dec { name, amount } => {
                self.emit_step(statement.line, name, amount.as_ref(), "fsub")?;
            }

            StatementKind::Out(value) => self.emit_out(value)?,
        }

        Ok(())
    }

    fn emit_if(
        &mut self,
        condition: &Expression,
        then_branch: &[Statement],
        else_branch: Option<&[Statement]>,
    ) -> Result<(), CodegenError> {
        let condition_reg = self.emit_expression(condition)?;
        let bool_reg = self.next_temp();
        let then_label = self.next_label();
        let else_label = self.next_label();
        let end_label = self.next_label();

        writeln!(self.output, "  %t{bool_reg} = fcmp one double %t{condition_reg}, 0.0")?;

        if let Some(else_branch) = else_branch {
            writeln!(
                self.output,
                "  br i1 %t{bool_reg}, label %then{then_label}, label %else{else_label}"
            )?;

            writeln!(self.output, "then{then_label}:")?;
            self.emit_branch(then_branch, end_label)?;

            writeln!(self.output, "else{else_label}:")?;
            self.emit_branch(else_branch, end_label)?;

            writeln!(self.output, "end{end_label}:")?;
        } else {
            writeln!(
                self.output,
                "  br i1 %t{bool_reg}, label %then{then_label}, label %end{end_label}"
            )?;

            writeln!(self.output, "then{then_label}:")?;
            self.emit_branch(then_branch, end_label)?;

            writeln!(self.output, "end{end_label}:")?;
        }

        Ok(())
    }

    /// Emits one `if` arm. The fallthrough branch to the merge label is
    /// suppressed when the arm's last statement is syntactically a return
    /// (no data-flow analysis; a branch that returns on every nested path
    /// but not in its last statement still gets the dead fallthrough).
    fn emit_branch(
        &mut self,
        statements: &[Statement],
        end_label: usize,
    ) -> Result<(), CodegenError> {
        for statement in statements {
            self.emit_statement(statement)?;
        }

        let returns = statements
            .last()
            .is_some_and(|statement| matches!(statement.kind, StatementKind::Return { .. }));

        if !returns {
            writeln!(self.output, "  br label %end{end_label}")?;
        }

        Ok(())
    }

    /// repeat lowers to a count-up loop: the counter slot starts at 1.0 and
    /// runs while `counter <= bound`, with the bound evaluated once up
    /// front. A named counter stays visible (and mutable) after the loop.
    fn emit_repeat(
        &mut self,
        count: &Expression,
        binding: Option<&str>,
        body: &[Statement],
    ) -> Result<(), CodegenError> {
        let count_reg = self.emit_expression(count)?;

        let loop_start = self.next_label();
        let loop_body = self.next_label();
        let loop_end = self.next_label();

        let counter_slot = match binding {
            Some(name) => self.bind_local(name),
            None => self.reserve_local(),
        };

        writeln!(self.output, "  %local{counter_slot} = alloca double")?;
        writeln!(self.output, "  store double 1.0, double* %local{counter_slot}")?;

        writeln!(self.output, "  br label %loop_start{loop_start}")?;
        writeln!(self.output, "loop_start{loop_start}:")?;

        let counter_val = self.next_temp();
        writeln!(
            self.output,
            "  %t{counter_val} = load double, double* %local{counter_slot}"
        )?;

        let compare_reg = self.next_temp();
        writeln!(
            self.output,
            "  %t{compare_reg} = fcmp ole double %t{counter_val}, %t{count_reg}"
        )?;
        writeln!(
            self.output,
            "  br i1 %t{compare_reg}, label %loop_body{loop_body}, label %loop_end{loop_end}"
        )?;

        writeln!(self.output, "loop_body{loop_body}:")?;

        for statement in body {
            self.emit_statement(statement)?;
        }

        let step_load = self.next_temp();
        writeln!(
            self.output,
            "  %t{step_load} = load double, double* %local{counter_slot}"
        )?;

        let step_add = self.next_temp();
        writeln!(self.output, "  %t{step_add} = fadd double %t{step_load}, 1.0")?;
        writeln!(
            self.output,
            "  store double %t{step_add}, double* %local{counter_slot}"
        )?;
        writeln!(self.output, "  br label %loop_start{loop_start}")?;

        writeln!(self.output, "loop_end{loop_end}:")?;

        Ok(())
    }

    /// while re-evaluates its condition at the top of every iteration.
    fn emit_while(&mut self, condition: &Expression, body: &[Statement]) -> Result<(), CodegenError> {
        let loop_start = self.next_label();
        let loop_body = self.next_label();
        let loop_end = self.next_label();

        writeln!(self.output, "  br label %while_start{loop_start}")?;
        writeln!(self.output, "while_start{loop_start}:")?;

        let condition_reg = self.emit_expression(condition)?;
        let bool_reg = self.next_temp();
        writeln!(self.output, "  %t{bool_reg} = fcmp one double %t{condition_reg}, 0.0")?;
        writeln!(
            self.output,
            "  br i1 %t{bool_reg}, label %while_body{loop_body}, label %while_end{loop_end}"
        )?;

        writeln!(self.output, "while_body{loop_body}:")?;

        for statement in body {
            self.emit_statement(statement)?;
        }

        writeln!(self.output, "  br label %while_start{loop_start}")?;
        writeln!(self.output, "while_end{loop_end}:")?;

        Ok(())
    }

    /// Shared lowering for `inc`/`dec`: load the slot, apply the step
    /// (default 1.0), store back. Parameters are not storage slots, so
    /// stepping one is an unknown-variable error.
    fn emit_step(
        &mut self,
        line: u32,
        name: &str,
        amount: Option<&Expression>,
        instruction: &str,
    ) -> Result<(), CodegenError> {
        let slot = self
            .find_local(name)
            .ok_or_else(|| CodegenError::UnknownVariable {
                name: name.to_owned(),
                line,
            })?;

        let load_reg = self.next_temp();
        writeln!(self.output, "  %t{load_reg} = load double, double* %local{slot}")?;

        let amount_reg = match amount {
            Some(expression) => self.emit_expression(expression)?,
            None => {
                let amount_reg = self.next_temp();
                writeln!(self.output, "  %t{amount_reg} = fadd double 0.0, 1.0")?;
                amount_reg
            }
        };

        let result_reg = self.next_temp();
        writeln!(
            self.output,
            "  %t{result_reg} = {instruction} double %t{load_reg}, %t{amount_reg}"
        )?;
        writeln!(self.output, "  store double %t{result_reg}, double* %local{slot}")?;

        Ok(())
    }

    /// `out` with a string literal prints the next constant from the
    /// program-wide table; anything else evaluates to a double and prints
    /// through the numeric format string.
    fn emit_out(&mut self, value: &Expression) -> Result<(), CodegenError> {
        if let ExpressionKind::StringLiteral(text) = &value.kind {
            let index = self.strings_emitted;
            self.strings_emitted += 1;

            let length = text.len() + 1;
            let pointer_reg = self.next_temp();

            writeln!(
                self.output,
                "  %t{pointer_reg} = getelementptr [{length} x i8], [{length} x i8]* @.str{index}, i32 0, i32 0"
            )?;
            writeln!(
                self.output,
                "  call i32 (i8*, ...) @printf(i8* getelementptr ([4 x i8], [4 x i8]* @.fmt_str, i32 0, i32 0), i8* %t{pointer_reg})"
            )?;

            return Ok(());
        }

        let value_reg = self.emit_expression(value)?;
        writeln!(
            self.output,
            "  call i32 (i8*, ...) @printf(i8* getelementptr ([4 x i8], [4 x i8]* @.fmt_num, i32 0, i32 0), double %t{value_reg})"
        )?;

        Ok(())
    }

    /* Expressions */

    /// Lowers one expression, returning the `%t` temporary holding its
    /// value.
    fn emit_expression(&mut self, expression: &Expression) -> Result<usize, CodegenError> {
        match &expression.kind {
            ExpressionKind::NumberLiteral(value) => {
                let reg = self.next_temp();
                writeln!(
                    self.output,
                    "  %t{reg} = fadd double 0.0, {}",
                    format_double(*value)
                )?;
                Ok(reg)
            }

            // Strings are not first-class values; outside `out` position
            // they lower to a zero placeholder
            ExpressionKind::StringLiteral(text) => {
                let reg = self.next_temp();
                writeln!(self.output, "  ; string: \"{text}\"")?;
                writeln!(self.output, "  %t{reg} = fadd double 0.0, 0.0")?;
                Ok(reg)
            }

            ExpressionKind::BooleanLiteral(value) => {
                let reg = self.next_temp();
                writeln!(
                    self.output,
                    "  %t{reg} = fadd double 0.0, {}",
                    if *value { "1.0" } else { "0.0" }
                )?;
                Ok(reg)
            }

            ExpressionKind::Variable(name) => {
                if let Some(slot) = self.find_local(name) {
                    let reg = self.next_temp();
                    writeln!(self.output, "  %t{reg} = load double, double* %local{slot}")?;
                    return Ok(reg);
                }

                if let Some(index) = self.find_parameter(name) {
                    let reg = self.next_temp();
                    writeln!(self.output, "  %t{reg} = fadd double 0.0, %arg{index}")?;
                    return Ok(reg);
                }

                Err(CodegenError::UnknownVariable {
                    name: name.clone(),
                    line: expression.line,
                })
            }

            ExpressionKind::Positional(index) => {
                let reg = self.next_temp();
                writeln!(self.output, "  %t{reg} = fadd double 0.0, %arg{index}")?;
                Ok(reg)
            }

            ExpressionKind::Binary { operator, lhs, rhs } => {
                let left_reg = self.emit_expression(lhs)?;
                let right_reg = self.emit_expression(rhs)?;
                self.emit_binary_operation(*operator, left_reg, right_reg)
            }

            ExpressionKind::Unary { operator, operand } => {
                let operand_reg = self.emit_expression(operand)?;

                match operator {
                    UnaryOperatorKind::LogicalNot => {
                        let bool_reg = self.next_temp();
                        writeln!(
                            self.output,
                            "  %t{bool_reg} = fcmp oeq double %t{operand_reg}, 0.0"
                        )?;
                        self.emit_widen(bool_reg)
                    }
                    UnaryOperatorKind::Negate => {
                        let reg = self.next_temp();
                        writeln!(self.output, "  %t{reg} = fsub double 0.0, %t{operand_reg}")?;
                        Ok(reg)
                    }
                }
            }

            ExpressionKind::Call {
                module: None,
                function,
                arguments,
            } => {
                writeln!(self.output, "  ; call {function}")?;

                let mut argument_regs = Vec::with_capacity(arguments.len());
                for argument in arguments {
                    argument_regs.push(self.emit_expression(argument)?);
                }

                let reg = self.next_temp();
                let arguments = argument_regs
                    .iter()
                    .map(|reg| format!("double %t{reg}"))
                    .join(", ");

                writeln!(self.output, "  %t{reg} = call double @{function}({arguments})")?;
                Ok(reg)
            }

            ExpressionKind::Call {
                module: Some(module),
                function,
                arguments,
            } => self.emit_module_call(expression.line, *module, function, arguments),
        }
    }

    fn emit_binary_operation(
        &mut self,
        operator: BinaryOperatorKind,
        left_reg: usize,
        right_reg: usize,
    ) -> Result<usize, CodegenError> {
        // Direct floating-point arithmetic
        let arithmetic = match operator {
            BinaryOperatorKind::Add => Some("fadd"),
            BinaryOperatorKind::Subtract => Some("fsub"),
            BinaryOperatorKind::Multiply => Some("fmul"),
            BinaryOperatorKind::Divide => Some("fdiv"),
            BinaryOperatorKind::Modulus => Some("frem"),
            _ => None,
        };

        if let Some(instruction) = arithmetic {
            let reg = self.next_temp();
            writeln!(
                self.output,
                "  %t{reg} = {instruction} double %t{left_reg}, %t{right_reg}"
            )?;
            return Ok(reg);
        }

        // Comparisons produce an i1 then widen back to double
        let comparison = match operator {
            BinaryOperatorKind::Equals => Some("oeq"),
            BinaryOperatorKind::NotEquals => Some("one"),
            BinaryOperatorKind::LessThan => Some("olt"),
            BinaryOperatorKind::GreaterThan => Some("ogt"),
            BinaryOperatorKind::LessThanOrEqualTo => Some("ole"),
            BinaryOperatorKind::GreaterThanOrEqualTo => Some("oge"),
            _ => None,
        };

        if let Some(condition) = comparison {
            let compare_reg = self.next_temp();
            writeln!(
                self.output,
                "  %t{compare_reg} = fcmp {condition} double %t{left_reg}, %t{right_reg}"
            )?;
            return self.emit_widen(compare_reg);
        }

        // and/or test each operand for truthiness (not equal to 0.0) before
        // combining
        let combine = match operator {
            BinaryOperatorKind::LogicalAnd => "and",
            BinaryOperatorKind::LogicalOr => "or",
            _ => unreachable!(),
        };

        let left_bool = self.next_temp();
        writeln!(self.output, "  %t{left_bool} = fcmp one double %t{left_reg}, 0.0")?;

        let right_bool = self.next_temp();
        writeln!(self.output, "  %t{right_bool} = fcmp one double %t{right_reg}, 0.0")?;

        let combined_reg = self.next_temp();
        writeln!(
            self.output,
            "  %t{combined_reg} = {combine} i1 %t{left_bool}, %t{right_bool}"
        )?;

        self.emit_widen(combined_reg)
    }

    /// uitofp an i1 back into the 0.0/1.0 double representation.
    fn emit_widen(&mut self, bool_reg: usize) -> Result<usize, CodegenError> {
        let reg = self.next_temp();
        writeln!(self.output, "  %t{reg} = uitofp i1 %t{bool_reg} to double")?;
        Ok(reg)
    }

    /// Module-qualified calls lower to LLVM math intrinsics. Anything
    /// outside the intrinsic table (wrong module, unknown function, or
    /// wrong arity) is an error rather than a silent placeholder.
    fn emit_module_call(
        &mut self,
        line: u32,
        module: ModuleName,
        function: &str,
        arguments: &[Expression],
    ) -> Result<usize, CodegenError> {
        writeln!(self.output, "  ; call {module}.{function}")?;

        let intrinsic = match module {
            ModuleName::Math => MATH_INTRINSICS
                .get(function)
                .filter(|intrinsic| intrinsic.arity == arguments.len()),
            _ => None,
        };

        let Some(intrinsic) = intrinsic else {
            return Err(CodegenError::UnknownCall {
                module: module.to_string(),
                function: function.to_owned(),
                line,
            });
        };

        let mut argument_regs = Vec::with_capacity(arguments.len());
        for argument in arguments {
            argument_regs.push(self.emit_expression(argument)?);
        }

        let reg = self.next_temp();
        let arguments = argument_regs
            .iter()
            .map(|reg| format!("double %t{reg}"))
            .join(", ");

        writeln!(
            self.output,
            "  %t{reg} = call double @{}({arguments})",
            intrinsic.symbol
        )?;

        Ok(reg)
    }
}

/// LLVM-compatible float text: integral magnitudes keep a `.0` suffix,
/// everything else goes through scientific notation.
fn format_double(value: f64) -> String {
    if value == value.trunc() && value.abs() <= 1e15 {
        format!("{value:.1}")
    } else {
        format!("{value:e}")
    }
}

/// Byte-array constant payload: printable ASCII passes through, quotes,
/// backslashes, and everything non-printable become `\XX` hex escapes.
fn encode_string_constant(text: &str) -> String {
    let mut encoded = String::with_capacity(text.len());

    for byte in text.bytes() {
        if byte == b'\\' || byte == b'"' || !(32..127).contains(&byte) {
            encoded.push_str(&format!("\\{byte:02X}"));
        } else {
            encoded.push(byte as char);
        }
    }

    encoded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::{SourceFile, lexer::Lexer, parser::Parser};

    fn generate(source: &str) -> String {
        let file = SourceFile::in_memory(source);
        let tokens = Lexer::new(&file).tokenize().expect("source should tokenize");
        let program = Parser::parse_program(&file, tokens).expect("source should parse");
        CodeGenerator::generate(&program).expect("program should lower")
    }

    fn generate_err(source: &str) -> CodegenError {
        let file = SourceFile::in_memory(source);
        let tokens = Lexer::new(&file).tokenize().expect("source should tokenize");
        let program = Parser::parse_program(&file, tokens).expect("source should parse");
        CodeGenerator::generate(&program).expect_err("program should not lower")
    }

    #[test]
    fn add_function_lowers_to_fadd() {
        let ir = generate("fn add a b\nret a plus b\n");

        assert!(ir.contains("define double @add(double %arg0, double %arg1) {"));
        assert!(ir.contains("fadd double %t"));
        assert!(ir.contains("ret double %t"));
    }

    #[test]
    fn body_without_return_gets_implicit_zero_return() {
        let ir = generate("fn noisy\nout 1\n");

        assert!(ir.contains("  ret double 0.0\n"));
    }

    #[test]
    fn comparisons_widen_an_i1_back_to_double() {
        let ir = generate("fn f a b\nret a lt b\n");

        assert!(ir.contains("fcmp olt double"));
        assert!(ir.contains("uitofp i1"));
    }

    #[test]
    fn logical_operators_test_operand_truthiness() {
        let ir = generate("fn f a b\nret a and b or a\n");

        assert!(ir.contains("and i1"));
        assert!(ir.contains("or i1"));
        // each operand is compared against zero before combining
        assert!(ir.matches("fcmp one double").count() >= 4);
    }

    #[test]
    fn both_arms_returning_suppresses_fallthrough_branches() {
        let ir = generate("fn abs x\nif x lt zero ret neg x else ret x\n");

        assert!(ir.contains("then0:"));
        assert!(ir.contains("else1:"));
        assert!(ir.contains("end2:"));
        assert!(!ir.contains("br label %end2"));
        // the merge block still needs a terminator
        assert!(ir.contains("end2:\n  ret double 0.0"));
    }

    #[test]
    fn non_returning_arm_branches_to_the_merge_block() {
        let ir = generate("fn f x\nif x gt zero\nout x\nelse\nout 0\ndone\nret x\n");

        assert_eq!(ir.matches("br label %end2").count(), 2);
    }

    #[test]
    fn let_rebinding_reuses_the_original_slot() {
        let ir = generate("fn f\nlet x one\nlet x two\nret x\n");

        assert_eq!(ir.matches("alloca double").count(), 1);
        assert_eq!(ir.matches("store double %t").count(), 2);
    }

    #[test]
    fn repeat_counter_starts_at_one_and_compares_inclusive() {
        let ir = generate("fn f\nrepeat 3 times as i\nout i\ndone\n");

        assert!(ir.contains("store double 1.0, double* %local0"));
        assert!(ir.contains("fcmp ole double"));
        assert!(ir.contains("loop_start0:"));
        assert!(ir.contains("loop_body1:"));
        assert!(ir.contains("loop_end2:"));
        assert!(ir.contains("@.fmt_num"));
    }

    #[test]
    fn named_repeat_counter_stays_bound_after_the_loop() {
        let ir = generate("fn f\nrepeat 2 times as i\nout i\ndone\nret i\n");

        // the final `ret i` loads the counter slot instead of failing
        assert!(ir.contains("ret double %t"));
    }

    #[test]
    fn while_reevaluates_its_condition_each_iteration() {
        let ir = generate("fn f n\nlet result one\nlet x n\nwhile x gt one\nlet result result times x\ndec x\ndone\nret result\n");

        assert!(ir.contains("while_start0:"));
        assert!(ir.contains("while_body1:"));
        assert!(ir.contains("while_end2:"));
        assert!(ir.contains("fmul double"));
        // condition compare lives after the while_start label so it reruns
        let start = ir.find("while_start0:").unwrap();
        let compare = ir[start..].find("fcmp ogt double").unwrap();
        let branch = ir[start..].find("br i1").unwrap();
        assert!(compare < branch);
    }

    #[test]
    fn inc_defaults_to_a_unit_step() {
        let ir = generate("fn f\nlet x one\ninc x\nret x\n");

        assert!(ir.contains("fadd double 0.0, 1.0"));
        assert!(ir.contains("fadd double %t"));
    }

    #[test]
    fn string_table_is_positional_not_deduplicated() {
        let ir = generate("fn f\nout \"hi\"\nout \"hi\"\n");

        assert!(ir.contains("@.str0 = private constant [3 x i8] c\"hi\\00\""));
        assert!(ir.contains("@.str1 = private constant [3 x i8] c\"hi\\00\""));
        assert!(ir.contains("@.str0, i32 0, i32 0"));
        assert!(ir.contains("@.str1, i32 0, i32 0"));
    }

    #[test]
    fn string_constant_indices_span_functions() {
        let ir = generate("fn f\nout \"one\"\nfn g\nout \"two\"\n");

        assert!(ir.contains("@.str0 = private constant [4 x i8] c\"one\\00\""));
        assert!(ir.contains("@.str1 = private constant [4 x i8] c\"two\\00\""));
        // g consumes the entry collected for it, not index zero again
        let g_body = &ir[ir.find("define double @g").unwrap()..];
        assert!(g_body.contains("@.str1, i32 0, i32 0"));
    }

    #[test]
    fn string_constants_escape_quotes_and_backslashes() {
        let ir = generate("fn f\nout \"say \\\"hi\\\"\"\n");

        // the raw backslash-quote pairs encode byte by byte
        assert!(ir.contains("c\"say \\5C\\22hi\\5C\\22\\00\""));
    }

    #[test]
    fn string_outside_out_position_lowers_to_zero_placeholder() {
        let ir = generate("fn f\nlet x \"oops\"\nret x\n");

        assert!(ir.contains("; string: \"oops\""));
        assert!(ir.contains("fadd double 0.0, 0.0"));
    }

    #[test]
    fn math_calls_lower_to_llvm_intrinsics() {
        let ir = generate("fn f x y\nret math sqrt x plus math max x y\n");

        assert!(ir.contains("call double @llvm.sqrt.f64(double %t"));
        assert!(ir.contains("call double @llvm.maxnum.f64(double %t"));
    }

    #[test]
    fn user_calls_pass_arguments_positionally() {
        let ir = generate("fn square x\nret x times x\nfn f\nret call square 3\n");

        assert!(ir.contains("call double @square(double %t"));
    }

    #[test]
    fn unknown_variable_reports_name_and_line() {
        let error = generate_err("fn f\nret missing\n");

        assert_eq!(
            error,
            CodegenError::UnknownVariable {
                name: "missing".to_owned(),
                line: 2,
            }
        );
    }

    #[test]
    fn inc_on_a_parameter_is_an_unknown_variable() {
        let error = generate_err("fn f x\ninc x\nret x\n");

        assert!(matches!(error, CodegenError::UnknownVariable { .. }));
    }

    #[test]
    fn unknown_module_calls_fail_instead_of_degrading() {
        let error = generate_err("fn f x\nret math tan x\n");

        assert_eq!(
            error,
            CodegenError::UnknownCall {
                module: "math".to_owned(),
                function: "tan".to_owned(),
                line: 2,
            }
        );
    }

    #[test]
    fn wrong_intrinsic_arity_is_an_unknown_call() {
        let error = generate_err("fn f x\nret math pow x\n");

        assert!(matches!(error, CodegenError::UnknownCall { .. }));
    }

    #[test]
    fn temp_and_label_counters_reset_per_function() {
        let ir = generate("fn f x\nif x gt zero\nout x\ndone\nret x\nfn g y\nif y gt zero\nout y\ndone\nret y\n");

        // both functions start numbering from %t0 and then0
        assert_eq!(ir.matches("%t0 = ").count(), 2);
        assert_eq!(ir.matches("then0:").count(), 2);
    }

    #[test]
    fn generation_is_deterministic() {
        let source = "fn f a b\nout \"x\"\nif a gt b\nout a\nelse\nout b\ndone\nret a plus b\n";

        assert_eq!(generate(source), generate(source));
    }

    #[test]
    fn number_literals_keep_a_decimal_point() {
        let ir = generate("fn f\nret 5\n");

        assert!(ir.contains("fadd double 0.0, 5.0"));
    }

    #[test]
    fn fractional_literals_use_scientific_notation() {
        let ir = generate("fn f\nret 2.5\n");

        assert!(ir.contains("fadd double 0.0, 2.5e0"));
    }
}
