//! Name resolution shared by the parts of the program model.
use crate::type_factory::TypeFactory;
use p4fpga_ir::{self as ir, DeclKind, Expr, Path, ReferenceMap, Type, TypeMap};
use p4fpga_utils::{Error, FpgaResult, Id};

/// The front end's analysis results plus the type factory; everything a
/// part of the model needs to resolve names and compute widths.
#[derive(Clone, Copy)]
pub struct Context<'a> {
    pub ref_map: &'a ReferenceMap,
    pub type_map: &'a TypeMap,
    pub type_factory: &'a TypeFactory,
}

impl Context<'_> {
    pub fn decl_kind(&self, ty: &Type) -> Option<DeclKind> {
        ty.decl_name()
            .and_then(|name| self.type_map.get(name))
            .map(|decl| decl.kind)
    }

    pub fn is_header(&self, ty: &Type) -> bool {
        self.decl_kind(ty) == Some(DeclKind::Header)
    }

    /// Named types must be declared before they can be laid out.
    pub fn check_type(&self, ty: &Type) -> FpgaResult<()> {
        match ty.decl_name() {
            Some(name) if !self.type_map.contains(name) => {
                Err(Error::undefined(name, "type"))
            }
            _ => Ok(()),
        }
    }
}

/// Lowercase the first character so the name is a valid BSV identifier for
/// a variable or struct member.
pub fn bsv_ident(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) => c.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Name of the pipeline metadata member holding `field` of struct `ty`.
/// Keyed by type rather than parameter name because blocks bind the same
/// argument under different names.
pub fn struct_member_name(ty: Id, field: Id) -> String {
    bsv_ident(&format!("{}${}", ty, field))
}

/// A resolved reference to a field, header or parameter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldRef {
    pub path: Path,
    /// Type of the whole path.
    pub ty: Type,
    /// Pipeline metadata member the path lives in. `None` for action
    /// parameters.
    pub member: Option<String>,
    /// Is the metadata member a (`Maybe`-wrapped) header?
    pub member_is_header: bool,
    /// Selections below the member.
    pub rest: Vec<Id>,
}

impl FieldRef {
    /// BSV expression reading this reference inside a rule that has the
    /// packet metadata bound to `meta` and the action data to `params`.
    pub fn bsv_access(&self) -> String {
        let base = match &self.member {
            None => return format!("params.{}", self.path.join(".")),
            Some(member) if self.member_is_header && !self.rest.is_empty() => {
                format!("fromMaybe(?, meta.{})", member)
            }
            Some(member) => format!("meta.{}", member),
        };
        self.rest
            .iter()
            .fold(base, |acc, sel| format!("{}.{}", acc, sel))
    }

    /// The metadata member as an lvalue.
    pub fn member_lvalue(&self) -> Option<String> {
        self.member.as_ref().map(|m| format!("meta.{}", m))
    }

    /// Does this reference denote a whole header?
    pub fn is_header(&self) -> bool {
        self.member_is_header && self.rest.is_empty()
    }
}

/// Where references are resolved: a block, optionally inside one of its
/// actions.
pub struct Scope<'a> {
    ctx: Context<'a>,
    block: Id,
    action: Option<Id>,
}

impl<'a> Scope<'a> {
    pub fn block(ctx: Context<'a>, block: Id) -> Self {
        Scope {
            ctx,
            block,
            action: None,
        }
    }

    pub fn action(ctx: Context<'a>, control: Id, action: Id) -> Self {
        Scope {
            ctx,
            block: control,
            action: Some(ReferenceMap::action_scope(control, action)),
        }
    }

    fn undefined(&self, path: &Path, what: &str) -> Error {
        Error::undefined(Id::from(path.to_string()), what)
            .with_post_msg(Some(format!("while resolving names in `{}`", self.block)))
    }

    /// Resolve `path` to a field reference.
    pub fn resolve(&self, path: &Path) -> FpgaResult<FieldRef> {
        let root = path.root();
        if let Some(action) = self.action {
            if let Some(ty) = self.ctx.ref_map.param_type(&[action], root) {
                let ty = self
                    .ctx
                    .type_map
                    .lookup(ty, path.members())
                    .ok_or_else(|| self.undefined(path, "field"))?
                    .clone();
                return Ok(FieldRef {
                    path: path.clone(),
                    ty,
                    member: None,
                    member_is_header: false,
                    rest: vec![],
                });
            }
        }

        let root_ty = self
            .ctx
            .ref_map
            .param_type(&[self.block], root)
            .ok_or_else(|| self.undefined(path, "parameter"))?;
        let steps = self
            .ctx
            .type_map
            .lookup_steps(root_ty, path.members())
            .ok_or_else(|| self.undefined(path, "field"))?;
        let ty = steps.last().copied().unwrap_or(root_ty).clone();

        let (member, member_ty, rest) = match self.ctx.decl_kind(root_ty) {
            Some(DeclKind::Struct) => {
                let (Some(first), Some(first_ty)) =
                    (path.members().first(), steps.first())
                else {
                    return Err(Error::malformed_structure(format!(
                        "`{}` names a whole struct where a field is expected",
                        path
                    )));
                };
                let struct_name = root_ty.decl_name().unwrap_or_default();
                (
                    struct_member_name(struct_name, *first),
                    *first_ty,
                    path.members()[1..].to_vec(),
                )
            }
            Some(_) => (
                bsv_ident(root_ty.decl_name().unwrap_or_default().as_str()),
                root_ty,
                path.members().to_vec(),
            ),
            None => (bsv_ident(root.as_str()), root_ty, vec![]),
        };

        Ok(FieldRef {
            path: path.clone(),
            ty,
            member: Some(member),
            member_is_header: self.ctx.is_header(member_ty),
            rest,
        })
    }

    /// Resolve `path` and require it to be a whole header. Returns the
    /// reference and the header's type name.
    pub fn resolve_header(&self, path: &Path) -> FpgaResult<(FieldRef, Id)> {
        let field = self.resolve(path)?;
        match field.ty.decl_name() {
            Some(name) if field.is_header() => Ok((field, name)),
            _ => Err(Error::malformed_structure(format!(
                "`{}` in `{}` is not a header",
                path, self.block
            ))),
        }
    }

    /// Resolve `path` and require a scalar (bit string or boolean) field.
    /// Returns the reference and its width.
    pub fn resolve_scalar(&self, path: &Path) -> FpgaResult<(FieldRef, u64)> {
        let field = self.resolve(path)?;
        match field.ty {
            Type::Bits { .. } | Type::Int { .. } | Type::Bool => {
                let width = self.ctx.type_factory.width(&field.ty);
                Ok((field, width))
            }
            Type::Named { .. } => Err(Error::malformed_structure(format!(
                "`{}` in `{}` is not a scalar field",
                path, self.block
            ))),
        }
    }

    /// Lower an expression to BSV.
    pub fn lower_expr(&self, expr: &Expr) -> FpgaResult<String> {
        Ok(match expr {
            Expr::Field { path } => self.resolve(path)?.bsv_access(),
            Expr::Const {
                value,
                width: Some(w),
            } => format!("{}'h{:x}", w, value),
            Expr::Const { value, width: None } => value.to_string(),
            Expr::IsValid { path } => {
                let (field, _) = self.resolve_header(path)?;
                let member = field.member_lvalue().unwrap_or_default();
                format!("isValid({})", member)
            }
            Expr::Not { expr } => format!("!({})", self.lower_expr(expr)?),
            Expr::Binary { op, lhs, rhs } => format!(
                "({} {} {})",
                self.lower_expr(lhs)?,
                op.symbol(),
                self.lower_expr(rhs)?
            ),
        })
    }

    /// Lower an action statement to BSV lines.
    pub fn lower_action_stmt(
        &self,
        stmt: &ir::ActionStmt,
    ) -> FpgaResult<Vec<String>> {
        use ir::ActionStmt as S;
        Ok(match stmt {
            S::Assign { dst, src } => {
                let dst_ref = self.resolve(dst)?;
                let src = self.lower_expr(src)?;
                let Some(lvalue) = dst_ref.member_lvalue() else {
                    return Err(Error::malformed_structure(format!(
                        "cannot assign to action parameter `{}`",
                        dst
                    )));
                };
                if dst_ref.member_is_header && !dst_ref.rest.is_empty() {
                    let sel = dst_ref.rest.iter().map(|s| s.as_str()).collect::<Vec<_>>();
                    vec![
                        "begin".to_string(),
                        format!("    let h = fromMaybe(?, {});", lvalue),
                        format!("    h.{} = {};", sel.join("."), src),
                        format!("    {} = tagged Valid h;", lvalue),
                        "end".to_string(),
                    ]
                } else if dst_ref.member_is_header {
                    vec![format!("{} = tagged Valid {};", lvalue, src)]
                } else {
                    let mut target = lvalue;
                    for sel in &dst_ref.rest {
                        target = format!("{}.{}", target, sel);
                    }
                    vec![format!("{} = {};", target, src)]
                }
            }
            S::SetValid { path } => {
                let (field, _) = self.resolve_header(path)?;
                let lvalue = field.member_lvalue().unwrap_or_default();
                vec![format!("{0} = tagged Valid fromMaybe(?, {0});", lvalue)]
            }
            S::SetInvalid { path } => {
                let (field, _) = self.resolve_header(path)?;
                let lvalue = field.member_lvalue().unwrap_or_default();
                vec![format!("{} = tagged Invalid;", lvalue)]
            }
            S::Drop => vec!["meta.dropped = True;".to_string()],
        })
    }
}
