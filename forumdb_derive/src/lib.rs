use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{
    Data, DeriveInput, Fields, Ident, LitInt, LitStr, Type, parse_macro_input, spanned::Spanned,
};

#[proc_macro_derive(Model, attributes(model, column))]
pub fn derive_model(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand_model(input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

struct ModelOptions {
    table_name: Option<String>,
}

#[derive(Default)]
struct ColumnOptions {
    column_name: Option<String>,
    unique: Vec<String>,
    foreign: Option<String>,
    skip: bool,
    id: bool,
    rules: Vec<Rule>,
}

enum Rule {
    Required,
    Gte(i64),
    Lte(i64),
    Email,
}

impl Rule {
    fn call(&self, field: &Ident) -> TokenStream2 {
        match self {
            Self::Required => quote!(::forumdb::model::validate::required(&self.#field)),
            Self::Gte(bound) => quote!(::forumdb::model::validate::gte(&self.#field, #bound)),
            Self::Lte(bound) => quote!(::forumdb::model::validate::lte(&self.#field, #bound)),
            Self::Email => quote!(::forumdb::model::validate::email(&self.#field)),
        }
    }
}

struct ModelField {
    ident: Ident,
    ty: Type,
    name: String,
    column: String,
    options: ColumnOptions,
}

fn expand_model(input: DeriveInput) -> syn::Result<TokenStream2> {
    let struct_name = input.ident;

    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            input.generics,
            "Model does not support generic structs",
        ));
    }

    let model_options = parse_model_options(&input.attrs)?;
    let table_name = model_options.table_name.ok_or_else(|| {
        syn::Error::new(
            struct_name.span(),
            "Model requires #[model(table = \"...\")]",
        )
    })?;

    let data_struct = match input.data {
        Data::Struct(data) => data,
        _ => {
            return Err(syn::Error::new(
                struct_name.span(),
                "Model can only be derived for structs",
            ));
        }
    };

    let named_fields = match data_struct.fields {
        Fields::Named(fields) => fields,
        _ => {
            return Err(syn::Error::new(
                struct_name.span(),
                "Model requires named fields",
            ));
        }
    };

    let mut fields = Vec::<ModelField>::new();
    for field in named_fields.named {
        let ident = field
            .ident
            .clone()
            .ok_or_else(|| syn::Error::new(field.span(), "Model requires named fields"))?;
        let options = parse_column_options(&field.attrs)?;
        if options.skip {
            continue;
        }
        let name = ident.to_string().trim_start_matches("r#").to_string();
        let column = options.column_name.clone().unwrap_or_else(|| name.clone());
        fields.push(ModelField {
            ident,
            ty: field.ty,
            name,
            column,
            options,
        });
    }

    if fields.is_empty() {
        return Err(syn::Error::new(
            struct_name.span(),
            "Model requires at least one persisted field",
        ));
    }

    let explicit_ids = fields.iter().filter(|f| f.options.id).count();
    if explicit_ids > 1 {
        return Err(syn::Error::new(
            struct_name.span(),
            "Only one field can be marked #[column(id)]",
        ));
    }
    let id_index = if explicit_ids == 1 {
        fields.iter().position(|f| f.options.id)
    } else {
        fields.iter().position(|f| f.name == "id")
    };

    let column_metas = fields.iter().map(|field| {
        let name = field.name.as_str();
        let column = field.column.as_str();
        let unique = field.options.unique.iter().map(String::as_str);
        let foreign = match &field.options.foreign {
            Some(foreign) => quote!(Some(#foreign)),
            None => quote!(None),
        };
        let required = field
            .options
            .rules
            .iter()
            .any(|rule| matches!(rule, Rule::Required));
        quote! {
            ::forumdb::model::ColumnMeta {
                field: #name,
                column: #column,
                unique: &[#(#unique),*],
                foreign: #foreign,
                required: #required,
            }
        }
    });

    let (id_getter, id_setter) = match id_index {
        Some(index) => {
            let ident = &fields[index].ident;
            (
                quote!(Some(self.#ident)),
                quote!(self.#ident = id;),
            )
        }
        None => (quote!(None), quote!(let _ = id;)),
    };

    let change_steps = fields
        .iter()
        .enumerate()
        .filter(|(index, _)| Some(*index) != id_index)
        .map(|(_, field)| {
            let ident = &field.ident;
            let ty = &field.ty;
            let name = field.name.as_str();
            let column = field.column.as_str();
            quote! {
                if <#ty as ::forumdb::model::ColumnType>::is_changed(&self.#ident, &requested.#ident, mode) {
                    changes.push(
                        #name,
                        #column,
                        <#ty as ::forumdb::model::ColumnType>::to_value(&requested.#ident),
                    );
                    self.#ident = ::core::clone::Clone::clone(&requested.#ident);
                }
            }
        });

    let value_arms = fields.iter().map(|field| {
        let ident = &field.ident;
        let ty = &field.ty;
        let column = field.column.as_str();
        quote! {
            #column => Some(<#ty as ::forumdb::model::ColumnType>::to_value(&self.#ident)),
        }
    });

    let assign_arms = fields.iter().map(|field| {
        let ident = &field.ident;
        let ty = &field.ty;
        let column = field.column.as_str();
        quote! {
            #column => {
                self.#ident = <#ty as ::forumdb::model::ColumnType>::from_value(value)?;
                Ok(true)
            }
        }
    });

    let validate_steps = fields
        .iter()
        .filter(|field| !field.options.rules.is_empty())
        .map(|field| {
            let name = field.name.as_str();
            let calls = field.options.rules.iter().map(|rule| rule.call(&field.ident));
            quote! {
                let reason = None::<String>#(.or_else(|| #calls))*;
                if let Some(reason) = reason {
                    errors.insert(#name.to_string(), reason);
                }
            }
        });

    Ok(quote! {
        impl ::forumdb::model::Model for #struct_name {
            fn table_name() -> &'static str {
                #table_name
            }

            fn columns() -> &'static [::forumdb::model::ColumnMeta] {
                const COLUMNS: &[::forumdb::model::ColumnMeta] = &[#(#column_metas),*];
                COLUMNS
            }

            fn id(&self) -> Option<i64> {
                #id_getter
            }

            fn set_id(&mut self, id: i64) {
                #id_setter
            }

            fn compute_changes(
                &mut self,
                requested: &Self,
                mode: ::forumdb::change::ChangeMode,
            ) -> ::forumdb::change::ChangeSet {
                let mut changes = ::forumdb::change::ChangeSet::new();
                let _ = mode;
                #(#change_steps)*
                changes.finish()
            }

            fn column_value(&self, column: &str) -> Option<::forumdb::Value> {
                match column {
                    #(#value_arms)*
                    _ => None,
                }
            }

            fn assign(&mut self, column: &str, value: &::forumdb::Value) -> ::forumdb::Result<bool> {
                match column {
                    #(#assign_arms)*
                    _ => Ok(false),
                }
            }

            fn validate(&self) -> ::std::result::Result<(), ::forumdb::FieldErrors> {
                #[allow(unused_mut)]
                let mut errors = ::forumdb::FieldErrors::new();
                #(#validate_steps)*
                if errors.is_empty() {
                    Ok(())
                } else {
                    Err(errors)
                }
            }
        }
    })
}

fn parse_model_options(attrs: &[syn::Attribute]) -> syn::Result<ModelOptions> {
    let mut options = ModelOptions { table_name: None };

    for attr in attrs {
        if !attr.path().is_ident("model") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                let value = meta.value()?;
                let lit: LitStr = value.parse()?;
                options.table_name = Some(lit.value());
                return Ok(());
            }

            Err(meta.error("Unsupported model attribute. Supported: table = \"...\""))
        })?;
    }

    Ok(options)
}

fn parse_column_options(attrs: &[syn::Attribute]) -> syn::Result<ColumnOptions> {
    let mut parsed = ColumnOptions::default();
    let mut seen = false;

    for attr in attrs {
        if !attr.path().is_ident("column") {
            continue;
        }

        if seen {
            return Err(syn::Error::new(
                attr.span(),
                "Duplicate #[column(...)] attribute on field",
            ));
        }
        seen = true;

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("skip") {
                parsed.skip = true;
                return Ok(());
            }

            if meta.path.is_ident("id") {
                parsed.id = true;
                return Ok(());
            }

            if meta.path.is_ident("name") {
                let lit: LitStr = meta.value()?.parse()?;
                parsed.column_name = Some(lit.value());
                return Ok(());
            }

            if meta.path.is_ident("unique") {
                let lit: LitStr = meta.value()?.parse()?;
                parsed.unique = lit
                    .value()
                    .split(',')
                    .map(|name| name.trim().to_string())
                    .filter(|name| !name.is_empty())
                    .collect();
                return Ok(());
            }

            if meta.path.is_ident("foreign") {
                let lit: LitStr = meta.value()?.parse()?;
                parsed.foreign = Some(lit.value());
                return Ok(());
            }

            if meta.path.is_ident("validate") {
                return meta.parse_nested_meta(|rule| {
                    if rule.path.is_ident("required") {
                        parsed.rules.push(Rule::Required);
                        return Ok(());
                    }
                    if rule.path.is_ident("email") {
                        parsed.rules.push(Rule::Email);
                        return Ok(());
                    }
                    if rule.path.is_ident("gte") {
                        let lit: LitInt = rule.value()?.parse()?;
                        parsed.rules.push(Rule::Gte(lit.base10_parse()?));
                        return Ok(());
                    }
                    if rule.path.is_ident("lte") {
                        let lit: LitInt = rule.value()?.parse()?;
                        parsed.rules.push(Rule::Lte(lit.base10_parse()?));
                        return Ok(());
                    }
                    Err(rule.error(
                        "Unsupported validate rule. Supported: required, email, gte = <n>, lte = <n>",
                    ))
                });
            }

            Err(meta.error(
                "Unsupported #[column(...)] option. Supported: name, unique, foreign, skip, id, validate(...)",
            ))
        })?;
    }

    if parsed.skip
        && (parsed.id
            || parsed.column_name.is_some()
            || !parsed.unique.is_empty()
            || parsed.foreign.is_some()
            || !parsed.rules.is_empty())
    {
        return Err(syn::Error::new(
            proc_macro2::Span::call_site(),
            "#[column(skip)] cannot be combined with other column options",
        ));
    }

    Ok(parsed)
}
