//! # Coal Derive Macros
//!
//! Procedural macros for `coal`. They turn a plain struct definition into
//! the metadata the framework needs: a wire name, an ordered field list
//! with type-erased accessors, and (for object classes) an optional
//! supertype link.
//!
//! ## Attributes
//!
//! - `#[coal(name = "WireName")]` on the struct or on a field renames it on
//!   the wire. Wire names are what schema evolution matches on, so two
//!   different Rust types can interoperate by sharing one.
//! - `#[coal(extends)]` on exactly one field of a `CoalObject` struct marks
//!   the embedded supertype state. The field's type must itself derive
//!   `CoalObject`; it is excluded from the own-field list and becomes the
//!   class's supertype link.
//!
//! Compatible with `syn` 2.0.

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, Attribute, Data, DeriveInput, Fields, LitStr};

/// Derives `coal::CoalStructure` (and `coal::CoalType`) for a value
/// structure.
#[proc_macro_derive(CoalStructure, attributes(coal))]
pub fn derive_coal_structure(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = input.ident;

    let fields = match collect_fields(&input.data, &name) {
        Ok(fields) => fields,
        Err(e) => return e.to_compile_error().into(),
    };
    if let Some(extends) = fields.iter().find(|f| f.extends) {
        return syn::Error::new(
            extends.ident.span(),
            "#[coal(extends)] is only meaningful on CoalObject structs",
        )
        .to_compile_error()
        .into();
    }

    let type_name = match container_wire_name(&input.attrs, &name) {
        Ok(type_name) => type_name,
        Err(e) => return e.to_compile_error().into(),
    };
    let descriptions = fields.iter().map(FieldSpec::description);

    let expanded = quote! {
        impl coal::CoalStructure for #name {
            fn type_name() -> &'static str {
                #type_name
            }

            fn fields() -> Vec<coal::FieldDescription> {
                vec![ #(#descriptions),* ]
            }
        }

        impl coal::CoalType for #name {
            fn type_mapper() -> coal::TypeMapperRc {
                coal::structure_type_mapper::<#name>()
            }
        }
    };
    TokenStream::from(expanded)
}

/// Derives `coal::CoalObject` for a reference class.
#[proc_macro_derive(CoalObject, attributes(coal))]
pub fn derive_coal_object(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = input.ident;

    let fields = match collect_fields(&input.data, &name) {
        Ok(fields) => fields,
        Err(e) => return e.to_compile_error().into(),
    };

    let extends: Vec<&FieldSpec> = fields.iter().filter(|f| f.extends).collect();
    if extends.len() > 1 {
        return syn::Error::new(
            extends[1].ident.span(),
            "at most one field may carry #[coal(extends)]",
        )
        .to_compile_error()
        .into();
    }

    let type_name = match container_wire_name(&input.attrs, &name) {
        Ok(type_name) => type_name,
        Err(e) => return e.to_compile_error().into(),
    };
    let descriptions = fields
        .iter()
        .filter(|f| !f.extends)
        .map(FieldSpec::description);

    let supertype = extends.first().map(|parent| {
        let ident = &parent.ident;
        let ty = &parent.ty;
        quote! {
            fn supertype() -> Option<coal::SupertypeBinding> {
                Some(coal::SupertypeBinding::new::<Self, #ty>(
                    |object: &Self| &object.#ident,
                    |object: &mut Self| &mut object.#ident,
                ))
            }
        }
    });

    let expanded = quote! {
        impl coal::CoalObject for #name {
            fn type_name() -> &'static str {
                #type_name
            }

            fn fields() -> Vec<coal::FieldDescription> {
                vec![ #(#descriptions),* ]
            }

            #supertype
        }
    };
    TokenStream::from(expanded)
}

// --- Internal data structures ---

struct FieldSpec {
    ident: syn::Ident,
    ty: syn::Type,
    wire_name: String,
    extends: bool,
}

impl FieldSpec {
    fn description(&self) -> proc_macro2::TokenStream {
        let ident = &self.ident;
        let ty = &self.ty;
        let wire_name = &self.wire_name;
        quote! {
            coal::FieldDescription::new::<Self, #ty>(
                #wire_name,
                |object: &Self| &object.#ident,
                |object: &mut Self| &mut object.#ident,
            )
        }
    }
}

// --- Parsing logic (syn 2.0) ---

fn collect_fields(data: &Data, name: &syn::Ident) -> syn::Result<Vec<FieldSpec>> {
    let data_struct = match data {
        Data::Struct(data_struct) => data_struct,
        _ => {
            return Err(syn::Error::new(
                name.span(),
                "Coal derives only support structs",
            ))
        }
    };
    let named = match &data_struct.fields {
        Fields::Named(named) => named,
        Fields::Unit => return Ok(Vec::new()),
        Fields::Unnamed(unnamed) => {
            return Err(syn::Error::new_spanned(
                unnamed,
                "Coal derives require named fields",
            ))
        }
    };

    let mut specs = Vec::new();
    for field in &named.named {
        let ident = field
            .ident
            .clone()
            .ok_or_else(|| syn::Error::new_spanned(field, "expected a named field"))?;
        let (rename, extends) = parse_field_attributes(&field.attrs)?;
        specs.push(FieldSpec {
            wire_name: rename.unwrap_or_else(|| ident.to_string()),
            ident,
            ty: field.ty.clone(),
            extends,
        });
    }
    Ok(specs)
}

/// Parses `#[coal(...)]` on a field. Returns `(rename, extends)`.
fn parse_field_attributes(attrs: &[Attribute]) -> syn::Result<(Option<String>, bool)> {
    let mut rename = None;
    let mut extends = false;

    for attr in attrs {
        if attr.path().is_ident("coal") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("extends") {
                    extends = true;
                    return Ok(());
                }
                if meta.path.is_ident("name") {
                    let value = meta.value()?;
                    let s: LitStr = value.parse()?;
                    rename = Some(s.value());
                    return Ok(());
                }
                Err(meta.error("unknown coal attribute key"))
            })?;
        }
    }
    Ok((rename, extends))
}

/// Parses `#[coal(name = "...")]` on the container.
fn container_wire_name(attrs: &[Attribute], ident: &syn::Ident) -> syn::Result<String> {
    let mut wire_name = None;

    for attr in attrs {
        if attr.path().is_ident("coal") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("name") {
                    let value = meta.value()?;
                    let s: LitStr = value.parse()?;
                    wire_name = Some(s.value());
                    return Ok(());
                }
                Err(meta.error("unknown coal attribute key"))
            })?;
        }
    }
    Ok(wire_name.unwrap_or_else(|| ident.to_string()))
}
