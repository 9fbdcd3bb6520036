use thiserror::Error;

use crate::frontend::{
    SourceFile,
    ast::{
        BinaryOperatorKind, Expression, ExpressionKind, FunctionDefinition, ModuleName, Parameter,
        Program, ReturnVariant, Statement, StatementKind, TypeDefinition, TypeDefinitionKind,
        UnaryOperatorKind,
    },
    lexer::{Keyword, Token, TokenKind},
};

/// Recursive-descent parser over the token list produced by the lexer.
///
/// Statements are newline-terminated; blocks (`if`, `repeat`, `while`) run
/// to the `done` keyword and function bodies run to the next `fn`/`type`
/// definition or end of input. Expressions use an explicit precedence
/// ladder, lowest to highest:
///
/// ```text
/// expression     -> or
/// or             -> and ( "or" and )*
/// and            -> comparison ( "and" comparison )*
/// comparison     -> additive ( ( "eq" | "neq" | "lt" | "gt" | "lte" | "gte" ) additive )*
/// additive       -> multiplicative ( ( "plus" | "minus" ) multiplicative )*
/// multiplicative -> unary ( ( "times" | "over" | "mod" ) unary )*
/// unary          -> ( "not" | "neg" ) unary | call
/// call           -> "call" IDENT unary* | MODULE IDENT unary* | primary
/// primary        -> NUMBER | STRING | NUMBER_WORD | POSITIONAL
///                   | "true" | "false" | IDENT
/// ```
///
/// The parser performs no semantic validation; undefined names and arity
/// mistakes surface later, during code generation or not at all.
#[derive(Debug)]
pub struct Parser<'source> {
    source: &'source SourceFile,
    tokens: Vec<Token>,
    position: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("line {line}: expected {expected}, found {found}")]
    ExpectedToken {
        line: u32,
        expected: String,
        found: String,
    },

    #[error("line {line}: unexpected token {found}")]
    UnexpectedToken { line: u32, found: String },

    #[error("expected {expected} but reached end of input")]
    UnexpectedEndOfInput { expected: String },
}

impl<'source> Parser<'source> {
    pub fn parse_program(
        source: &'source SourceFile,
        tokens: Vec<Token>,
    ) -> Result<Program, ParseError> {
        let mut parser = Self {
            source,
            tokens,
            position: 0,
        };

        let mut program = Program {
            type_definitions: Vec::new(),
            function_definitions: Vec::new(),
        };

        parser.skip_newlines();

        while !parser.at_end() {
            if parser.check_keyword(Keyword::Type) {
                program.type_definitions.push(parser.parse_type_definition()?);
            } else if parser.check_keyword(Keyword::Fn) {
                program
                    .function_definitions
                    .push(parser.parse_function_definition()?);
            } else if parser.match_kind(TokenKind::Newline) {
                continue;
            } else {
                let found = parser.describe_current();
                return Err(ParseError::ExpectedToken {
                    line: parser.current().line,
                    expected: "`fn` or `type` definition".to_owned(),
                    found,
                });
            }

            parser.skip_newlines();
        }

        Ok(program)
    }

    /* Token cursor */

    fn current(&self) -> Token {
        self.tokens[self.position]
    }

    fn at_end(&self) -> bool {
        self.current().kind == TokenKind::Eof
    }

    fn advance(&mut self) -> Token {
        let token = self.current();

        if !self.at_end() {
            self.position += 1;
        }

        token
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current().kind == kind
    }

    fn check_keyword(&self, keyword: Keyword) -> bool {
        self.check(TokenKind::Keyword(keyword))
    }

    fn match_kind(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            return true;
        }

        false
    }

    fn match_keyword(&mut self, keyword: Keyword) -> bool {
        self.match_kind(TokenKind::Keyword(keyword))
    }

    fn at_end_of_line(&self) -> bool {
        matches!(self.current().kind, TokenKind::Newline | TokenKind::Eof)
    }

    fn skip_newlines(&mut self) {
        while self.match_kind(TokenKind::Newline) {}
    }

    fn text(&self, token: Token) -> &'source str {
        self.source.value_of_span(token.span)
    }

    fn describe_current(&self) -> String {
        let token = self.current();

        match token.kind {
            TokenKind::Keyword(_) => format!("`{}`", self.text(token)),
            TokenKind::Identifier => format!("identifier `{}`", self.text(token)),
            TokenKind::NumberLiteral => format!("number `{}`", self.text(token)),
            TokenKind::StringLiteral => "string literal".to_owned(),
            TokenKind::Newline => "end of line".to_owned(),
            TokenKind::Eof => "end of input".to_owned(),
        }
    }

    fn expected(&self, expecting: &str) -> ParseError {
        if self.at_end() {
            return ParseError::UnexpectedEndOfInput {
                expected: expecting.to_owned(),
            };
        }

        ParseError::ExpectedToken {
            line: self.current().line,
            expected: expecting.to_owned(),
            found: self.describe_current(),
        }
    }

    fn expect_keyword(&mut self, keyword: Keyword, expecting: &str) -> Result<Token, ParseError> {
        if self.check_keyword(keyword) {
            return Ok(self.advance());
        }

        Err(self.expected(expecting))
    }

    fn expect_identifier(&mut self, expecting: &str) -> Result<String, ParseError> {
        if self.check(TokenKind::Identifier) {
            let token = self.advance();
            return Ok(self.text(token).to_owned());
        }

        Err(self.expected(expecting))
    }

    /* Definitions */

    /// fn name param* NEWLINE statement* (until the next `fn`/`type` or EOF)
    fn parse_function_definition(&mut self) -> Result<FunctionDefinition, ParseError> {
        let fn_keyword = self.expect_keyword(Keyword::Fn, "`fn`")?;
        let name = self.expect_identifier("function name after `fn`")?;

        // Parameters are bare identifiers up to the end of the line
        let mut parameters = Vec::new();

        while !self.at_end_of_line() && self.check(TokenKind::Identifier) {
            let token = self.advance();
            parameters.push(Parameter {
                line: token.line,
                name: self.text(token).to_owned(),
            });
        }

        self.match_kind(TokenKind::Newline);
        self.skip_newlines();

        let mut body = Vec::new();

        while !self.at_end() && !self.check_keyword(Keyword::Fn) && !self.check_keyword(Keyword::Type)
        {
            if self.match_kind(TokenKind::Newline) {
                continue;
            }

            body.push(self.parse_statement()?);
            self.skip_newlines();
        }

        Ok(FunctionDefinition {
            line: fn_keyword.line,
            name,
            parameters,
            body,
        })
    }

    /// type Name ok TYPE or err TYPE
    /// type Name TYPE*
    fn parse_type_definition(&mut self) -> Result<TypeDefinition, ParseError> {
        let type_keyword = self.expect_keyword(Keyword::Type, "`type`")?;
        let name = self.expect_identifier("type name after `type`")?;

        let kind = if self.match_keyword(Keyword::Ok) {
            let ok = self.match_type_name();
            self.expect_keyword(Keyword::Or, "`or` in union type")?;
            self.expect_keyword(Keyword::Err, "`err` in union type")?;
            let err = self.match_type_name();

            TypeDefinitionKind::Union { ok, err }
        } else {
            let mut fields = Vec::new();

            while !self.at_end_of_line() {
                let token = self.current();

                let is_field = match token.kind {
                    TokenKind::Keyword(keyword) => keyword.is_type_name(),
                    TokenKind::Identifier => true,
                    _ => false,
                };

                if !is_field {
                    break;
                }

                self.advance();
                fields.push(self.text(token).to_owned());
            }

            TypeDefinitionKind::Record { fields }
        };

        self.match_kind(TokenKind::Newline);

        Ok(TypeDefinition {
            line: type_keyword.line,
            name,
            kind,
        })
    }

    fn match_type_name(&mut self) -> Option<String> {
        match self.current().kind {
            TokenKind::Keyword(keyword) if keyword.is_type_name() => {
                let token = self.advance();
                Some(self.text(token).to_owned())
            }
            _ => None,
        }
    }

    /* Statements */

    fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        let line = self.current().line;

        if self.match_keyword(Keyword::Ret) {
            let statement = self.parse_return_tail(line)?;
            self.match_kind(TokenKind::Newline);
            return Ok(statement);
        }

        if self.match_keyword(Keyword::Out) {
            let value = self.parse_expression()?;
            self.match_kind(TokenKind::Newline);

            return Ok(Statement {
                line,
                kind: StatementKind::Out(value),
            });
        }

        if self.match_keyword(Keyword::Inc) {
            let name = self.expect_identifier("variable name after `inc`")?;
            let amount = self.parse_optional_amount()?;
            self.match_kind(TokenKind::Newline);

            return Ok(Statement {
                line,
                kind: StatementKind::Inc { name, amount },
            });
        }

        if self.match_keyword(Keyword::Dec) {
            let name = self.expect_identifier("variable name after `dec`")?;
            let amount = self.parse_optional_amount()?;
            self.match_kind(TokenKind::Newline);

            return Ok(Statement {
                line,
                kind: StatementKind::Dec { name, amount },
            });
        }

        if self.check_keyword(Keyword::If) {
            return self.parse_if_statement();
        }

        if self.match_keyword(Keyword::Let) {
            let name = self.expect_identifier("variable name after `let`")?;
            let value = self.parse_expression()?;
            self.match_kind(TokenKind::Newline);

            return Ok(Statement {
                line,
                kind: StatementKind::Let { name, value },
            });
        }

        if self.match_keyword(Keyword::Repeat) {
            return self.parse_repeat_tail(line);
        }

        if self.match_keyword(Keyword::While) {
            let condition = self.parse_comparison_expression()?;
            self.match_kind(TokenKind::Newline);
            self.skip_newlines();

            let body = self.parse_block_statements()?;
            self.expect_keyword(Keyword::Done, "`done` to end while block")?;
            self.match_kind(TokenKind::Newline);

            return Ok(Statement {
                line,
                kind: StatementKind::While { condition, body },
            });
        }

        let expression = self.parse_expression()?;
        self.match_kind(TokenKind::Newline);

        Ok(Statement {
            line,
            kind: StatementKind::Expression(expression),
        })
    }

    /// The statements allowed on the same line as an `if` condition: return,
    /// print, binding, or a bare expression.
    fn parse_inline_statement(&mut self) -> Result<Statement, ParseError> {
        let line = self.current().line;

        if self.match_keyword(Keyword::Ret) {
            return self.parse_return_tail(line);
        }

        if self.match_keyword(Keyword::Out) {
            let value = self.parse_expression()?;

            return Ok(Statement {
                line,
                kind: StatementKind::Out(value),
            });
        }

        if self.match_keyword(Keyword::Let) {
            let name = self.expect_identifier("variable name after `let`")?;
            let value = self.parse_expression()?;

            return Ok(Statement {
                line,
                kind: StatementKind::Let { name, value },
            });
        }

        let expression = self.parse_expression()?;

        Ok(Statement {
            line,
            kind: StatementKind::Expression(expression),
        })
    }

    /// `ret` has already been consumed; reads the optional `ok`/`err` tag
    /// and the return value.
    fn parse_return_tail(&mut self, line: u32) -> Result<Statement, ParseError> {
        let variant = if self.match_keyword(Keyword::Ok) {
            ReturnVariant::Ok
        } else if self.match_keyword(Keyword::Err) {
            ReturnVariant::Err
        } else {
            ReturnVariant::Plain
        };

        let value = self.parse_expression()?;

        Ok(Statement {
            line,
            kind: StatementKind::Return { variant, value },
        })
    }

    fn parse_optional_amount(&mut self) -> Result<Option<Expression>, ParseError> {
        if self.at_end_of_line() {
            return Ok(None);
        }

        Ok(Some(self.parse_expression()?))
    }

    /// Both `if` forms. A newline directly after the condition selects the
    /// block form (statements up to `else`/`done`); otherwise the
    /// consequent is a single statement on the same line.
    fn parse_if_statement(&mut self) -> Result<Statement, ParseError> {
        let if_keyword = self.expect_keyword(Keyword::If, "`if`")?;
        let condition = self.parse_comparison_expression()?;

        if self.check(TokenKind::Newline) {
            return self.parse_block_if_tail(if_keyword.line, condition);
        }

        // Inline form: if cond stmt [else stmt]
        let then_branch = vec![self.parse_inline_statement()?];

        let else_branch = if self.match_keyword(Keyword::Else) {
            if self.check_keyword(Keyword::If) {
                Some(vec![self.parse_statement()?])
            } else {
                let alternative = vec![self.parse_inline_statement()?];
                self.match_kind(TokenKind::Newline);
                Some(alternative)
            }
        } else {
            self.match_kind(TokenKind::Newline);
            None
        };

        Ok(Statement {
            line: if_keyword.line,
            kind: StatementKind::If {
                condition,
                then_branch,
                else_branch,
            },
        })
    }

    /// Block form: if cond NEWLINE stmt* [else [if ...] | else NEWLINE stmt*] done
    fn parse_block_if_tail(
        &mut self,
        line: u32,
        condition: Expression,
    ) -> Result<Statement, ParseError> {
        self.match_kind(TokenKind::Newline);
        self.skip_newlines();

        let mut then_branch = Vec::new();

        while !self.at_end()
            && !self.check_keyword(Keyword::Else)
            && !self.check_keyword(Keyword::Done)
        {
            if self.match_kind(TokenKind::Newline) {
                continue;
            }

            then_branch.push(self.parse_statement()?);
            self.skip_newlines();
        }

        let mut chained_if = false;

        let else_branch = if self.match_keyword(Keyword::Else) {
            self.match_kind(TokenKind::Newline);
            self.skip_newlines();

            if self.check_keyword(Keyword::If) {
                // An `else if` chain shares this construct's closing `done`;
                // the nested block-form if consumes it.
                chained_if = true;
                Some(vec![self.parse_statement()?])
            } else {
                let mut alternative = Vec::new();

                while !self.at_end() && !self.check_keyword(Keyword::Done) {
                    if self.match_kind(TokenKind::Newline) {
                        continue;
                    }

                    alternative.push(self.parse_statement()?);
                    self.skip_newlines();
                }

                Some(alternative)
            }
        } else {
            None
        };

        if chained_if {
            // Only an inline nested if leaves the shared `done` unconsumed
            if self.check_keyword(Keyword::Done) {
                self.advance();
                self.match_kind(TokenKind::Newline);
            }
        } else {
            self.expect_keyword(Keyword::Done, "`done` to end if block")?;
            self.match_kind(TokenKind::Newline);
        }

        Ok(Statement {
            line,
            kind: StatementKind::If {
                condition,
                then_branch,
                else_branch,
            },
        })
    }

    /// `repeat` has been consumed: repeat COUNT times [as IDENT] NEWLINE stmt* done
    ///
    /// The count is a primary expression so the following `times` keyword
    /// is not swallowed as a multiplication operator.
    fn parse_repeat_tail(&mut self, line: u32) -> Result<Statement, ParseError> {
        let count = self.parse_primary_expression()?;
        self.expect_keyword(Keyword::Times, "`times` after repeat count")?;

        let binding = if self.match_keyword(Keyword::As) {
            Some(self.expect_identifier("variable name after `as`")?)
        } else {
            None
        };

        self.match_kind(TokenKind::Newline);
        self.skip_newlines();

        let body = self.parse_block_statements()?;
        self.expect_keyword(Keyword::Done, "`done` to end repeat block")?;
        self.match_kind(TokenKind::Newline);

        Ok(Statement {
            line,
            kind: StatementKind::Repeat {
                count,
                binding,
                body,
            },
        })
    }

    /// Statements up to (but not including) the closing `done`.
    fn parse_block_statements(&mut self) -> Result<Vec<Statement>, ParseError> {
        let mut statements = Vec::new();

        while !self.at_end() && !self.check_keyword(Keyword::Done) {
            if self.match_kind(TokenKind::Newline) {
                continue;
            }

            statements.push(self.parse_statement()?);
            self.skip_newlines();
        }

        Ok(statements)
    }

    /* Expressions */

    fn parse_expression(&mut self) -> Result<Expression, ParseError> {
        self.parse_or_expression()
    }

    fn parse_or_expression(&mut self) -> Result<Expression, ParseError> {
        let mut expression = self.parse_and_expression()?;

        while self.check_keyword(Keyword::Or) {
            let operator = self.advance();
            let rhs = self.parse_and_expression()?;

            expression = Expression {
                line: operator.line,
                kind: ExpressionKind::Binary {
                    operator: BinaryOperatorKind::LogicalOr,
                    lhs: Box::new(expression),
                    rhs: Box::new(rhs),
                },
            };
        }

        Ok(expression)
    }

    fn parse_and_expression(&mut self) -> Result<Expression, ParseError> {
        let mut expression = self.parse_comparison_expression()?;

        while self.check_keyword(Keyword::And) {
            let operator = self.advance();
            let rhs = self.parse_comparison_expression()?;

            expression = Expression {
                line: operator.line,
                kind: ExpressionKind::Binary {
                    operator: BinaryOperatorKind::LogicalAnd,
                    lhs: Box::new(expression),
                    rhs: Box::new(rhs),
                },
            };
        }

        Ok(expression)
    }

    fn parse_comparison_expression(&mut self) -> Result<Expression, ParseError> {
        let mut expression = self.parse_additive_expression()?;

        while self.current_keyword().is_some_and(Keyword::is_comparison_operator) {
            let operator = self.parse_comparison_operator();
            let rhs = self.parse_additive_expression()?;

            expression = Expression {
                line: expression.line,
                kind: ExpressionKind::Binary {
                    operator,
                    lhs: Box::new(expression),
                    rhs: Box::new(rhs),
                },
            };
        }

        Ok(expression)
    }

    fn parse_comparison_operator(&mut self) -> BinaryOperatorKind {
        let token = self.advance();

        match token.kind {
            TokenKind::Keyword(Keyword::Eq) => BinaryOperatorKind::Equals,
            TokenKind::Keyword(Keyword::Neq) => BinaryOperatorKind::NotEquals,
            TokenKind::Keyword(Keyword::Lt) => BinaryOperatorKind::LessThan,
            TokenKind::Keyword(Keyword::Gt) => BinaryOperatorKind::GreaterThan,
            TokenKind::Keyword(Keyword::Lte) => BinaryOperatorKind::LessThanOrEqualTo,
            TokenKind::Keyword(Keyword::Gte) => BinaryOperatorKind::GreaterThanOrEqualTo,
            _ => unreachable!(),
        }
    }

    fn parse_additive_expression(&mut self) -> Result<Expression, ParseError> {
        let mut expression = self.parse_multiplicative_expression()?;

        while self.current_keyword().is_some_and(Keyword::is_term_operator) {
            let operator = self.parse_term_operator();
            let rhs = self.parse_multiplicative_expression()?;

            expression = Expression {
                line: expression.line,
                kind: ExpressionKind::Binary {
                    operator,
                    lhs: Box::new(expression),
                    rhs: Box::new(rhs),
                },
            };
        }

        Ok(expression)
    }

    fn parse_term_operator(&mut self) -> BinaryOperatorKind {
        let token = self.advance();

        match token.kind {
            TokenKind::Keyword(Keyword::Plus) => BinaryOperatorKind::Add,
            TokenKind::Keyword(Keyword::Minus) => BinaryOperatorKind::Subtract,
            _ => unreachable!(),
        }
    }

    fn parse_multiplicative_expression(&mut self) -> Result<Expression, ParseError> {
        let mut expression = self.parse_unary_expression()?;

        while self.current_keyword().is_some_and(Keyword::is_factor_operator) {
            let operator = self.parse_factor_operator();
            let rhs = self.parse_unary_expression()?;

            expression = Expression {
                line: expression.line,
                kind: ExpressionKind::Binary {
                    operator,
                    lhs: Box::new(expression),
                    rhs: Box::new(rhs),
                },
            };
        }

        Ok(expression)
    }

    fn parse_factor_operator(&mut self) -> BinaryOperatorKind {
        let token = self.advance();

        match token.kind {
            TokenKind::Keyword(Keyword::Times) => BinaryOperatorKind::Multiply,
            TokenKind::Keyword(Keyword::Over) => BinaryOperatorKind::Divide,
            TokenKind::Keyword(Keyword::Mod) => BinaryOperatorKind::Modulus,
            _ => unreachable!(),
        }
    }

    fn parse_unary_expression(&mut self) -> Result<Expression, ParseError> {
        let line = self.current().line;

        if self.match_keyword(Keyword::Not) {
            let operand = self.parse_unary_expression()?;

            return Ok(Expression {
                line,
                kind: ExpressionKind::Unary {
                    operator: UnaryOperatorKind::LogicalNot,
                    operand: Box::new(operand),
                },
            });
        }

        if self.match_keyword(Keyword::Neg) {
            let operand = self.parse_unary_expression()?;

            return Ok(Expression {
                line,
                kind: ExpressionKind::Unary {
                    operator: UnaryOperatorKind::Negate,
                    operand: Box::new(operand),
                },
            });
        }

        self.parse_call_expression()
    }

    /// User-defined calls (`call fib n`) and module-qualified calls
    /// (`math sqrt x`). Arguments are unary-level expressions consumed
    /// until a token that terminates the argument list.
    fn parse_call_expression(&mut self) -> Result<Expression, ParseError> {
        let line = self.current().line;

        if self.match_keyword(Keyword::Call) {
            let function = self.expect_identifier("function name after `call`")?;
            let arguments = self.parse_call_arguments()?;

            return Ok(Expression {
                line,
                kind: ExpressionKind::Call {
                    module: None,
                    function,
                    arguments,
                },
            });
        }

        if let Some(module) = self.current_keyword().and_then(module_name_for) {
            self.advance();
            let function = self.expect_identifier("function name after module")?;
            let arguments = self.parse_call_arguments()?;

            return Ok(Expression {
                line,
                kind: ExpressionKind::Call {
                    module: Some(module),
                    function,
                    arguments,
                },
            });
        }

        self.parse_primary_expression()
    }

    fn parse_call_arguments(&mut self) -> Result<Vec<Expression>, ParseError> {
        let mut arguments = Vec::new();

        while !self.ends_call_arguments() {
            arguments.push(self.parse_unary_expression()?);
        }

        Ok(arguments)
    }

    /// Tokens that terminate a call's argument run: the end of the line, any
    /// binary operator word, or a statement/block keyword.
    fn ends_call_arguments(&self) -> bool {
        if self.at_end_of_line() {
            return true;
        }

        let Some(keyword) = self.current_keyword() else {
            return false;
        };

        keyword.is_term_operator()
            || keyword.is_factor_operator()
            || keyword.is_comparison_operator()
            || matches!(
                keyword,
                Keyword::And
                    | Keyword::Or
                    | Keyword::Ret
                    | Keyword::Let
                    | Keyword::If
                    | Keyword::Else
                    | Keyword::Call
                    | Keyword::Out
                    | Keyword::Done
                    | Keyword::Repeat
                    | Keyword::As
                    | Keyword::While
            )
    }

    fn current_keyword(&self) -> Option<Keyword> {
        match self.current().kind {
            TokenKind::Keyword(keyword) => Some(keyword),
            _ => None,
        }
    }

    fn parse_primary_expression(&mut self) -> Result<Expression, ParseError> {
        let token = self.current();
        let line = token.line;

        if self.at_end() || self.check(TokenKind::Newline) {
            return Err(self.expected("expression"));
        }

        if self.check(TokenKind::NumberLiteral) {
            let token = self.advance();
            let value = self.parse_number_value(token)?;

            return Ok(Expression {
                line,
                kind: ExpressionKind::NumberLiteral(value),
            });
        }

        if self.check(TokenKind::StringLiteral) {
            let token = self.advance();

            return Ok(Expression {
                line,
                kind: ExpressionKind::StringLiteral(self.text(token).to_owned()),
            });
        }

        if let Some(keyword) = self.current_keyword() {
            if let Some(value) = keyword.number_word_value() {
                self.advance();

                return Ok(Expression {
                    line,
                    kind: ExpressionKind::NumberLiteral(value),
                });
            }

            if let Some(index) = keyword.positional_index() {
                self.advance();

                return Ok(Expression {
                    line,
                    kind: ExpressionKind::Positional(index),
                });
            }
        }

        if self.check(TokenKind::Identifier) {
            let token = self.advance();

            let kind = match self.text(token) {
                "true" => ExpressionKind::BooleanLiteral(true),
                "false" => ExpressionKind::BooleanLiteral(false),
                name => ExpressionKind::Variable(name.to_owned()),
            };

            return Ok(Expression { line, kind });
        }

        Err(ParseError::UnexpectedToken {
            line,
            found: self.describe_current(),
        })
    }

    fn parse_number_value(&self, token: Token) -> Result<f64, ParseError> {
        self.text(token)
            .parse()
            .map_err(|_| ParseError::UnexpectedToken {
                line: token.line,
                found: format!("number `{}`", self.text(token)),
            })
    }
}

/// Words that can head a module-qualified call (`math sqrt x`). The
/// grammar admits `str` and `err` here as well as the five module words.
fn module_name_for(keyword: Keyword) -> Option<ModuleName> {
    let module = match keyword {
        Keyword::Math => ModuleName::Math,
        Keyword::Str => ModuleName::Str,
        Keyword::List => ModuleName::List,
        Keyword::Time => ModuleName::Time,
        Keyword::Http => ModuleName::Http,
        Keyword::Json => ModuleName::Json,
        Keyword::Err => ModuleName::Err,
        _ => return None,
    };

    Some(module)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::lexer::Lexer;

    fn parse(source: &str) -> Program {
        let file = SourceFile::in_memory(source);
        let tokens = Lexer::new(&file).tokenize().expect("source should tokenize");
        Parser::parse_program(&file, tokens).expect("source should parse")
    }

    fn parse_err(source: &str) -> ParseError {
        let file = SourceFile::in_memory(source);
        let tokens = Lexer::new(&file).tokenize().expect("source should tokenize");
        Parser::parse_program(&file, tokens).expect_err("source should not parse")
    }

    fn only_function(program: &Program) -> &FunctionDefinition {
        assert_eq!(program.function_definitions.len(), 1);
        &program.function_definitions[0]
    }

    fn return_value(statement: &Statement) -> &Expression {
        match &statement.kind {
            StatementKind::Return { value, .. } => value,
            other => panic!("expected return statement, got {other:?}"),
        }
    }

    #[test]
    fn function_parameters_run_to_end_of_line() {
        let program = parse("fn add a b\nret a plus b\n");
        let function = only_function(&program);

        assert_eq!(function.name, "add");
        let names: Vec<_> = function.parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(function.body.len(), 1);
    }

    #[test]
    fn multiplicative_binds_tighter_than_additive() {
        let program = parse("fn f a b c\nret a plus b times c\n");
        let value = return_value(&only_function(&program).body[0]);

        let ExpressionKind::Binary { operator, rhs, .. } = &value.kind else {
            panic!("expected binary expression");
        };
        assert_eq!(*operator, BinaryOperatorKind::Add);

        let ExpressionKind::Binary { operator, .. } = &rhs.kind else {
            panic!("expected nested multiplication");
        };
        assert_eq!(*operator, BinaryOperatorKind::Multiply);
    }

    #[test]
    fn additive_chains_are_left_associative() {
        let program = parse("fn f a b c\nret a minus b minus c\n");
        let value = return_value(&only_function(&program).body[0]);

        // (a minus b) minus c
        let ExpressionKind::Binary { operator, lhs, rhs } = &value.kind else {
            panic!("expected binary expression");
        };
        assert_eq!(*operator, BinaryOperatorKind::Subtract);
        assert!(matches!(&rhs.kind, ExpressionKind::Variable(name) if name == "c"));
        assert!(matches!(&lhs.kind, ExpressionKind::Binary { .. }));
    }

    #[test]
    fn number_words_and_positionals_are_primaries() {
        let program = parse("fn f\nret seven plus first\n");
        let value = return_value(&only_function(&program).body[0]);

        let ExpressionKind::Binary { lhs, rhs, .. } = &value.kind else {
            panic!("expected binary expression");
        };
        assert!(matches!(lhs.kind, ExpressionKind::NumberLiteral(v) if v == 7.0));
        assert!(matches!(rhs.kind, ExpressionKind::Positional(0)));
    }

    #[test]
    fn boolean_identifiers_parse_as_literals() {
        let program = parse("fn f\nret true\n");
        let value = return_value(&only_function(&program).body[0]);

        assert!(matches!(value.kind, ExpressionKind::BooleanLiteral(true)));
    }

    #[test]
    fn call_arguments_stop_at_operator_words() {
        let program = parse("fn f x\nret call square x plus one\n");
        let value = return_value(&only_function(&program).body[0]);

        // (call square x) plus one
        let ExpressionKind::Binary { operator, lhs, .. } = &value.kind else {
            panic!("expected binary expression");
        };
        assert_eq!(*operator, BinaryOperatorKind::Add);

        let ExpressionKind::Call {
            module,
            function,
            arguments,
        } = &lhs.kind
        else {
            panic!("expected call expression");
        };
        assert!(module.is_none());
        assert_eq!(function, "square");
        assert_eq!(arguments.len(), 1);
    }

    #[test]
    fn module_calls_carry_their_module() {
        let program = parse("fn f x y\nret math max x y\n");
        let value = return_value(&only_function(&program).body[0]);

        let ExpressionKind::Call {
            module, arguments, ..
        } = &value.kind
        else {
            panic!("expected call expression");
        };
        assert_eq!(*module, Some(ModuleName::Math));
        assert_eq!(arguments.len(), 2);
    }

    #[test]
    fn unary_operators_nest_into_call_arguments() {
        let program = parse("fn f x\nret call square neg x\n");
        let value = return_value(&only_function(&program).body[0]);

        let ExpressionKind::Call { arguments, .. } = &value.kind else {
            panic!("expected call expression");
        };
        assert!(matches!(
            arguments[0].kind,
            ExpressionKind::Unary {
                operator: UnaryOperatorKind::Negate,
                ..
            }
        ));
    }

    #[test]
    fn inline_if_keeps_both_arms_on_one_line() {
        let program = parse("fn abs x\nif x lt zero ret neg x else ret x\n");
        let function = only_function(&program);

        let StatementKind::If {
            then_branch,
            else_branch,
            ..
        } = &function.body[0].kind
        else {
            panic!("expected if statement");
        };
        assert_eq!(then_branch.len(), 1);
        assert_eq!(else_branch.as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn block_if_retains_every_branch_statement() {
        let program = parse(
            "fn f x\nif x gt zero\nout 1\nout 2\nelse\nout 3\nout 4\ndone\nret x\n",
        );
        let function = only_function(&program);

        let StatementKind::If {
            then_branch,
            else_branch,
            ..
        } = &function.body[0].kind
        else {
            panic!("expected if statement");
        };
        assert_eq!(then_branch.len(), 2);
        assert_eq!(else_branch.as_ref().map(Vec::len), Some(2));
    }

    #[test]
    fn else_if_chain_shares_one_done() {
        let program = parse("fn f x\nif x gt one\nout 1\nelse if x gt zero\nout 2\ndone\nret x\n");
        let function = only_function(&program);
        assert_eq!(function.body.len(), 2);

        let StatementKind::If { else_branch, .. } = &function.body[0].kind else {
            panic!("expected if statement");
        };
        let chained = else_branch.as_ref().expect("expected else branch");
        assert_eq!(chained.len(), 1);
        assert!(matches!(chained[0].kind, StatementKind::If { .. }));
    }

    #[test]
    fn repeat_parses_count_binding_and_body() {
        let program = parse("fn f\nrepeat 3 times as i\nout i\ndone\nret 0\n");
        let function = only_function(&program);

        let StatementKind::Repeat {
            count,
            binding,
            body,
        } = &function.body[0].kind
        else {
            panic!("expected repeat statement");
        };
        assert!(matches!(count.kind, ExpressionKind::NumberLiteral(v) if v == 3.0));
        assert_eq!(binding.as_deref(), Some("i"));
        assert_eq!(body.len(), 1);
    }

    #[test]
    fn while_condition_is_comparison_level() {
        let program = parse("fn f x\nwhile x gt one\ndec x\ndone\nret x\n");
        let function = only_function(&program);

        let StatementKind::While { condition, body } = &function.body[0].kind else {
            panic!("expected while statement");
        };
        assert!(matches!(
            condition.kind,
            ExpressionKind::Binary {
                operator: BinaryOperatorKind::GreaterThan,
                ..
            }
        ));
        assert_eq!(body.len(), 1);
    }

    #[test]
    fn inc_and_dec_take_an_optional_amount() {
        let program = parse("fn f\nlet x one\ninc x\ndec x two\nret x\n");
        let function = only_function(&program);

        assert!(matches!(
            &function.body[1].kind,
            StatementKind::Inc { amount: None, .. }
        ));
        assert!(matches!(
            &function.body[2].kind,
            StatementKind::Dec {
                amount: Some(_),
                ..
            }
        ));
    }

    #[test]
    fn return_variant_tags_are_recorded() {
        let program = parse("fn f\nret ok 1\n");
        let function = only_function(&program);

        assert!(matches!(
            &function.body[0].kind,
            StatementKind::Return {
                variant: ReturnVariant::Ok,
                ..
            }
        ));
    }

    #[test]
    fn union_type_definitions_parse() {
        let program = parse("type Outcome ok num or err str\nfn f\nret 0\n");

        assert_eq!(program.type_definitions.len(), 1);
        let TypeDefinitionKind::Union { ok, err } = &program.type_definitions[0].kind else {
            panic!("expected union type");
        };
        assert_eq!(ok.as_deref(), Some("num"));
        assert_eq!(err.as_deref(), Some("str"));
    }

    #[test]
    fn record_type_definitions_collect_fields() {
        let program = parse("type Point num num\nfn f\nret 0\n");

        let TypeDefinitionKind::Record { fields } = &program.type_definitions[0].kind else {
            panic!("expected record type");
        };
        assert_eq!(fields, &vec!["num".to_owned(), "num".to_owned()]);
    }

    #[test]
    fn missing_call_target_is_reported_with_line() {
        let error = parse_err("fn f\nret call plus one\n");

        assert!(matches!(
            error,
            ParseError::ExpectedToken { line: 2, .. }
        ));
    }

    #[test]
    fn top_level_junk_is_rejected() {
        let error = parse_err("let x 1\n");

        assert!(matches!(error, ParseError::ExpectedToken { line: 1, .. }));
    }

    #[test]
    fn truncated_return_reports_end_of_input() {
        let error = parse_err("fn f\nret");

        assert_eq!(
            error,
            ParseError::UnexpectedEndOfInput {
                expected: "expression".to_owned(),
            }
        );
    }
}
