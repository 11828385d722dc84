//! GraphQL Parser.

use super::ast::{
    Definition, Directive, Document, Field, FragmentDefinition, FragmentSpread, InlineFragment,
    InputValue, OperationDefinition, OperationKind, Selection, SelectionSet, TypeRef,
    VariableDefinition,
};
use super::lexer::{Lexer, Token, TokenKind};
use nestql_common::utils::error::{Error, QueryError, QueryErrorKind, Result, SourceSpan};

/// GraphQL Parser.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
    source: &'a str,
}

impl<'a> Parser<'a> {
    /// Creates a new parser for the given input.
    pub fn new(input: &'a str) -> Self {
        let mut lexer = Lexer::new(input);
        let current = lexer.next_token();
        Self {
            lexer,
            current,
            source: input,
        }
    }

    /// Parses the input into a document.
    ///
    /// # Errors
    ///
    /// Returns a lexer or syntax error located at the offending token.
    pub fn parse(&mut self) -> Result<Document> {
        let mut definitions = Vec::new();
        while self.current.kind != TokenKind::Eof {
            definitions.push(self.parse_definition()?);
        }
        if definitions.is_empty() {
            return Err(self.error("Expected an operation or a fragment definition"));
        }
        Ok(Document { definitions })
    }

    fn parse_definition(&mut self) -> Result<Definition> {
        self.check_lexer()?;
        match self.current.kind {
            TokenKind::LBrace => {
                let span_start = self.current.span;
                let selection_set = self.parse_selection_set()?;
                Ok(Definition::Operation(OperationDefinition {
                    kind: OperationKind::Query,
                    name: None,
                    variables: Vec::new(),
                    directives: Vec::new(),
                    selection_set,
                    span: Some(self.span_from(span_start)),
                }))
            }
            TokenKind::Name => match self.current.text.as_str() {
                "query" => self.parse_operation(OperationKind::Query).map(Definition::Operation),
                "mutation" => self
                    .parse_operation(OperationKind::Mutation)
                    .map(Definition::Operation),
                "subscription" => self
                    .parse_operation(OperationKind::Subscription)
                    .map(Definition::Operation),
                "fragment" => self.parse_fragment_definition().map(Definition::Fragment),
                other => Err(self.error(&format!(
                    "Unexpected '{other}', expected query, mutation, subscription or fragment"
                ))),
            },
            _ => Err(self.error("Expected an operation or a fragment definition")),
        }
    }

    fn parse_operation(&mut self, kind: OperationKind) -> Result<OperationDefinition> {
        let span_start = self.current.span;
        self.advance();

        let name = if self.current.kind == TokenKind::Name {
            Some(self.parse_name()?)
        } else {
            None
        };
        let variables = if self.current.kind == TokenKind::LParen {
            self.parse_variable_definitions()?
        } else {
            Vec::new()
        };
        let directives = self.parse_directives()?;
        let selection_set = self.parse_selection_set()?;

        Ok(OperationDefinition {
            kind,
            name,
            variables,
            directives,
            selection_set,
            span: Some(self.span_from(span_start)),
        })
    }

    fn parse_variable_definitions(&mut self) -> Result<Vec<VariableDefinition>> {
        self.expect(TokenKind::LParen)?;
        let mut variables = Vec::new();
        while self.current.kind != TokenKind::RParen {
            self.expect(TokenKind::Dollar)?;
            let name = self.parse_name()?;
            self.expect(TokenKind::Colon)?;
            let var_type = self.parse_type()?;
            let default = if self.current.kind == TokenKind::Equals {
                self.advance();
                Some(self.parse_value(true)?)
            } else {
                None
            };
            // Variable directives are accepted and ignored.
            self.parse_directives()?;
            variables.push(VariableDefinition {
                name,
                var_type,
                default,
            });
        }
        if variables.is_empty() {
            return Err(self.error("Expected at least one variable definition"));
        }
        self.expect(TokenKind::RParen)?;
        Ok(variables)
    }

    fn parse_type(&mut self) -> Result<TypeRef> {
        let inner = if self.current.kind == TokenKind::LBracket {
            self.advance();
            let item = self.parse_type()?;
            self.expect(TokenKind::RBracket)?;
            TypeRef::List(Box::new(item))
        } else {
            TypeRef::Named(self.parse_name()?)
        };
        if self.current.kind == TokenKind::Bang {
            self.advance();
            return Ok(TypeRef::NonNull(Box::new(inner)));
        }
        Ok(inner)
    }

    fn parse_fragment_definition(&mut self) -> Result<FragmentDefinition> {
        let span_start = self.current.span;
        self.advance();

        let name = self.parse_name()?;
        if name == "on" {
            return Err(self.error("Fragment cannot be named 'on'"));
        }
        self.expect_keyword("on")?;
        let type_condition = self.parse_name()?;
        let directives = self.parse_directives()?;
        let selection_set = self.parse_selection_set()?;

        Ok(FragmentDefinition {
            name,
            type_condition,
            directives,
            selection_set,
            span: Some(self.span_from(span_start)),
        })
    }

    fn parse_selection_set(&mut self) -> Result<SelectionSet> {
        let span_start = self.current.span;
        self.expect(TokenKind::LBrace)?;

        let mut items = Vec::new();
        while self.current.kind != TokenKind::RBrace {
            items.push(self.parse_selection()?);
        }
        if items.is_empty() {
            return Err(self.error("Expected at least one selection"));
        }
        self.expect(TokenKind::RBrace)?;

        Ok(SelectionSet {
            items,
            span: Some(self.span_from(span_start)),
        })
    }

    fn parse_selection(&mut self) -> Result<Selection> {
        self.check_lexer()?;
        if self.current.kind != TokenKind::Spread {
            return self.parse_field().map(Selection::Field);
        }

        let span_start = self.current.span;
        self.advance();

        // `... Name` is a spread, `... on Type` / `... @dir` / `... {` inline.
        if self.current.kind == TokenKind::Name && self.current.text != "on" {
            let name = self.parse_name()?;
            let directives = self.parse_directives()?;
            return Ok(Selection::FragmentSpread(FragmentSpread {
                name,
                directives,
                span: Some(self.span_from(span_start)),
            }));
        }

        let type_condition = if self.current.kind == TokenKind::Name {
            self.advance();
            Some(self.parse_name()?)
        } else {
            None
        };
        let directives = self.parse_directives()?;
        let selection_set = self.parse_selection_set()?;
        Ok(Selection::InlineFragment(InlineFragment {
            type_condition,
            directives,
            selection_set,
            span: Some(self.span_from(span_start)),
        }))
    }

    fn parse_field(&mut self) -> Result<Field> {
        let span_start = self.current.span;

        let first = self.parse_name()?;
        let (alias, name) = if self.current.kind == TokenKind::Colon {
            self.advance();
            (Some(first), self.parse_name()?)
        } else {
            (None, first)
        };
        let arguments = self.parse_arguments(false)?;
        let directives = self.parse_directives()?;
        let selection_set = if self.current.kind == TokenKind::LBrace {
            Some(self.parse_selection_set()?)
        } else {
            None
        };

        Ok(Field {
            alias,
            name,
            arguments,
            directives,
            selection_set,
            span: Some(self.span_from(span_start)),
        })
    }

    fn parse_arguments(&mut self, is_const: bool) -> Result<Vec<(String, InputValue)>> {
        if self.current.kind != TokenKind::LParen {
            return Ok(Vec::new());
        }
        self.advance();

        let mut arguments = Vec::new();
        while self.current.kind != TokenKind::RParen {
            let name = self.parse_name()?;
            if arguments.iter().any(|(existing, _)| *existing == name) {
                return Err(self.error(&format!("Duplicate argument '{name}'")));
            }
            self.expect(TokenKind::Colon)?;
            let value = self.parse_value(is_const)?;
            arguments.push((name, value));
        }
        if arguments.is_empty() {
            return Err(self.error("Expected at least one argument"));
        }
        self.expect(TokenKind::RParen)?;
        Ok(arguments)
    }

    fn parse_directives(&mut self) -> Result<Vec<Directive>> {
        let mut directives = Vec::new();
        while self.current.kind == TokenKind::At {
            let span_start = self.current.span;
            self.advance();
            let name = self.parse_name()?;
            let arguments = self.parse_arguments(false)?;
            directives.push(Directive {
                name,
                arguments,
                span: Some(self.span_from(span_start)),
            });
        }
        Ok(directives)
    }

    fn parse_value(&mut self, is_const: bool) -> Result<InputValue> {
        self.check_lexer()?;
        let value = match self.current.kind {
            TokenKind::Dollar => {
                if is_const {
                    return Err(self.error("Variables are not allowed in default values"));
                }
                self.advance();
                return Ok(InputValue::Variable(self.parse_name()?));
            }
            TokenKind::Int => {
                let value = self
                    .current
                    .text
                    .parse::<i64>()
                    .map_err(|_| self.error("Integer literal out of range"))?;
                InputValue::Int(value)
            }
            TokenKind::Float => {
                let value = self
                    .current
                    .text
                    .parse::<f64>()
                    .map_err(|_| self.error("Invalid float literal"))?;
                InputValue::Float(value)
            }
            TokenKind::String | TokenKind::BlockString => {
                InputValue::String(self.current.text.clone())
            }
            TokenKind::Name => match self.current.text.as_str() {
                "true" => InputValue::Boolean(true),
                "false" => InputValue::Boolean(false),
                "null" => InputValue::Null,
                other => InputValue::Enum(other.to_string()),
            },
            TokenKind::LBracket => return self.parse_list(is_const),
            TokenKind::LBrace => return self.parse_object(is_const),
            _ => return Err(self.error("Expected a value")),
        };
        self.advance();
        Ok(value)
    }

    fn parse_list(&mut self, is_const: bool) -> Result<InputValue> {
        self.expect(TokenKind::LBracket)?;
        let mut items = Vec::new();
        while self.current.kind != TokenKind::RBracket {
            items.push(self.parse_value(is_const)?);
        }
        self.expect(TokenKind::RBracket)?;
        Ok(InputValue::List(items))
    }

    fn parse_object(&mut self, is_const: bool) -> Result<InputValue> {
        self.expect(TokenKind::LBrace)?;
        let mut fields: Vec<(String, InputValue)> = Vec::new();
        while self.current.kind != TokenKind::RBrace {
            let name = self.parse_name()?;
            if fields.iter().any(|(existing, _)| *existing == name) {
                return Err(self.error(&format!("Duplicate input field '{name}'")));
            }
            self.expect(TokenKind::Colon)?;
            let value = self.parse_value(is_const)?;
            fields.push((name, value));
        }
        self.expect(TokenKind::RBrace)?;
        Ok(InputValue::Object(fields))
    }

    fn parse_name(&mut self) -> Result<String> {
        self.check_lexer()?;
        if self.current.kind != TokenKind::Name {
            return Err(self.error("Expected a name"));
        }
        let name = std::mem::take(&mut self.current.text);
        self.advance();
        Ok(name)
    }

    fn advance(&mut self) {
        self.current = self.lexer.next_token();
    }

    fn expect(&mut self, kind: TokenKind) -> Result<()> {
        self.check_lexer()?;
        if self.current.kind == kind {
            self.advance();
            Ok(())
        } else {
            Err(self.error(&format!("Expected {kind:?}")))
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<()> {
        if self.current.kind == TokenKind::Name && self.current.text == keyword {
            self.advance();
            Ok(())
        } else {
            Err(self.error(&format!("Expected '{keyword}'")))
        }
    }

    fn check_lexer(&self) -> Result<()> {
        if self.current.kind == TokenKind::Error {
            return Err(Error::Query(
                QueryError::new(QueryErrorKind::Lexer, self.current.text.clone())
                    .with_span(self.current.span)
                    .with_source(self.source.to_string()),
            ));
        }
        Ok(())
    }

    fn span_from(&self, start: SourceSpan) -> SourceSpan {
        SourceSpan::new(start.start, self.current.span.start, start.line, start.column)
    }

    fn error(&self, message: &str) -> Error {
        if self.current.kind == TokenKind::Error {
            if let Err(lexer_error) = self.check_lexer() {
                return lexer_error;
            }
        }
        Error::Query(
            QueryError::new(QueryErrorKind::Syntax, message)
                .with_span(self.current.span)
                .with_source(self.source.to_string()),
        )
    }
}
