//! `#[capability]` implementation.
//!
//! The generated descriptor is built from type tags (the argument types as
//! written) and the raw doc comment; schema derivation itself happens at
//! runtime in `kaiten::tool`, so a function and a hand-written
//! `CapabilitySpec` describe themselves identically.

use std::collections::HashMap;

use convert_case::{Case, Casing};
use darling::util::PathList;
use darling::{FromMeta, ast::NestedMeta};
use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{
    Attribute, Expr, ExprLit, FnArg, Ident, ItemFn, Lit, Meta, Pat, ReturnType, Type,
    parse_macro_input,
};

/// Arguments of the `#[capability]` attribute.
#[derive(Debug, Default, FromMeta)]
#[darling(default)]
struct CapabilityArgs {
    /// Capability name (defaults to the function name).
    name: Option<String>,
    /// Description (overrides the doc comment summary).
    description: Option<String>,
    /// Parameters supplied by the runtime.
    inject: PathList,
    /// Per-parameter description overrides.
    params: ParamDescriptions,
}

#[derive(Debug, Default)]
struct ParamDescriptions(HashMap<String, String>);

impl FromMeta for ParamDescriptions {
    fn from_list(items: &[NestedMeta]) -> darling::Result<Self> {
        let mut map = HashMap::new();
        for item in items {
            let NestedMeta::Meta(Meta::NameValue(nv)) = item else {
                return Err(darling::Error::unsupported_format("expected `name = \"description\"`")
                    .with_span(item));
            };
            let (Some(ident), Expr::Lit(ExprLit { lit: Lit::Str(s), .. })) =
                (nv.path.get_ident(), &nv.value)
            else {
                return Err(darling::Error::unexpected_type("non-string description").with_span(nv));
            };
            map.insert(ident.to_string(), s.value());
        }
        Ok(Self(map))
    }
}

impl CapabilityArgs {
    fn from_args(args: TokenStream) -> darling::Result<Self> {
        let attr_args = NestedMeta::parse_meta_list(args.into())?;
        Self::from_list(&attr_args)
    }

    fn injected_names(&self) -> syn::Result<Vec<Ident>> {
        self.inject
            .iter()
            .map(|path| {
                path.get_ident().cloned().ok_or_else(|| {
                    syn::Error::new_spanned(path, "injected parameters are plain identifiers")
                })
            })
            .collect()
    }
}

/// One function argument.
struct Param {
    ident: Ident,
    ty: Type,
    injected: bool,
}

impl Param {
    /// Type tag understood by `TypeInfo::parse`.
    fn type_tag(&self) -> String {
        let ty = &self.ty;
        quote!(#ty).to_string().split_whitespace().collect()
    }

    fn spec_tokens(&self, description: Option<&String>) -> TokenStream2 {
        let name = self.ident.to_string();
        let tag = self.type_tag();
        let mut tokens = quote! { ::kaiten::tool::ParamSpec::new(#name, #tag) };
        if let Some(desc) = description {
            tokens = quote! { #tokens.with_description(#desc) };
        }
        if self.injected {
            tokens = quote! { #tokens.injected() };
        }
        tokens
    }
}

/// Raw doc comment, one line per `///`.
fn doc_comment(attrs: &[Attribute]) -> String {
    attrs
        .iter()
        .filter(|attr| attr.path().is_ident("doc"))
        .filter_map(|attr| match &attr.meta {
            Meta::NameValue(meta) => match &meta.value {
                Expr::Lit(ExprLit { lit: Lit::Str(s), .. }) => Some(s.value()),
                _ => None,
            },
            _ => None,
        })
        .map(|line| line.strip_prefix(' ').map_or_else(|| line.clone(), str::to_owned))
        .collect::<Vec<_>>()
        .join("\n")
}

fn validate(input_fn: &ItemFn) -> syn::Result<()> {
    let sig = &input_fn.sig;
    if !sig.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &sig.generics,
            "capability functions cannot be generic",
        ));
    }
    match &sig.output {
        ReturnType::Default => Err(syn::Error::new_spanned(
            &sig.ident,
            "capability functions must return Result<T, E>",
        )),
        ReturnType::Type(_, ty) => match &**ty {
            Type::Path(path)
                if path
                    .path
                    .segments
                    .last()
                    .is_some_and(|segment| segment.ident == "Result") =>
            {
                Ok(())
            }
            other => Err(syn::Error::new_spanned(
                other,
                "capability functions must return Result<T, E>",
            )),
        },
    }
}

fn collect_params(input_fn: &ItemFn, injected: &[Ident]) -> syn::Result<Vec<Param>> {
    let mut params = Vec::new();
    for arg in &input_fn.sig.inputs {
        let pat_type = match arg {
            FnArg::Receiver(receiver) => {
                return Err(syn::Error::new_spanned(
                    receiver,
                    "capability functions cannot take `self`",
                ));
            }
            FnArg::Typed(pat_type) => pat_type,
        };
        let Pat::Ident(pat_ident) = &*pat_type.pat else {
            return Err(syn::Error::new_spanned(
                &pat_type.pat,
                "capability parameters must be plain identifiers",
            ));
        };
        if let Type::Reference(reference) = &*pat_type.ty {
            return Err(syn::Error::new_spanned(
                reference,
                "capability parameters are taken by value; use an owned type",
            ));
        }
        params.push(Param {
            ident: pat_ident.ident.clone(),
            ty: (*pat_type.ty).clone(),
            injected: injected.contains(&pat_ident.ident),
        });
    }

    if let Some(unknown) = injected
        .iter()
        .find(|name| !params.iter().any(|p| p.ident == **name))
    {
        return Err(syn::Error::new_spanned(
            unknown,
            format!("`{unknown}` is not a parameter of this function"),
        ));
    }
    Ok(params)
}

fn expand(args: &CapabilityArgs, input_fn: &ItemFn) -> syn::Result<TokenStream2> {
    validate(input_fn)?;
    let injected = args.injected_names()?;
    let params = collect_params(input_fn, &injected)?;

    let fn_name = &input_fn.sig.ident;
    let vis = &input_fn.vis;
    let fn_name_str = fn_name.to_string();
    let capability_name = args.name.clone().unwrap_or_else(|| fn_name_str.clone());
    let struct_name = format_ident!("{}", fn_name_str.to_case(Case::Pascal));
    let struct_doc = format!("Capability generated from the `{fn_name_str}` function.");

    let description = args
        .description
        .as_ref()
        .map(|d| quote! { .with_description(#d) });
    let docs = doc_comment(&input_fn.attrs);
    let docs = (!docs.trim().is_empty()).then(|| quote! { .with_docs(#docs) });
    let param_specs = params
        .iter()
        .map(|p| p.spec_tokens(args.params.0.get(&p.ident.to_string())));

    let idents: Vec<_> = params.iter().map(|p| &p.ident).collect();
    let types: Vec<_> = params.iter().map(|p| &p.ty).collect();
    let names: Vec<_> = idents.iter().map(ToString::to_string).collect();
    let bind_args = if params.is_empty() {
        quote! { let _ = args; }
    } else {
        quote! {
            let mut args = args;
            #( let #idents: #types = args.take(#names)?; )*
        }
    };
    let call = if input_fn.sig.asyncness.is_some() {
        quote! { #fn_name(#(#idents),*).await }
    } else {
        quote! { #fn_name(#(#idents),*) }
    };

    Ok(quote! {
        #input_fn

        #[doc = #struct_doc]
        #[derive(Debug, Clone, Copy, Default)]
        #vis struct #struct_name;

        impl #struct_name {
            /// Shared handle, ready for registration.
            #[must_use]
            #vis fn shared() -> ::kaiten::tool::SharedCapability {
                ::std::sync::Arc::new(Self)
            }
        }

        #[::kaiten::__private::async_trait]
        impl ::kaiten::tool::Capability for #struct_name {
            fn spec(&self) -> &::kaiten::tool::CapabilitySpec {
                static SPEC: ::std::sync::LazyLock<::kaiten::tool::CapabilitySpec> =
                    ::std::sync::LazyLock::new(|| {
                        ::kaiten::tool::CapabilitySpec::new(#capability_name)
                            #description
                            #docs
                            #( .with_param(#param_specs) )*
                    });
                &SPEC
            }

            async fn invoke(
                &self,
                args: ::kaiten::tool::Arguments,
            ) -> ::kaiten::tool::ToolResult<::kaiten::__private::serde_json::Value> {
                #bind_args
                let output = #call.map_err(::core::convert::Into::<::kaiten::ToolError>::into)?;
                ::kaiten::__private::serde_json::to_value(output)
                    .map_err(|e| ::kaiten::ToolError::execution(e.to_string()))
            }
        }
    })
}

/// Entry point of the `#[capability]` attribute.
pub fn capability_impl(args: TokenStream, input: TokenStream) -> TokenStream {
    let macro_args = match CapabilityArgs::from_args(args) {
        Ok(args) => args,
        Err(err) => return TokenStream::from(err.write_errors()),
    };
    let input_fn = parse_macro_input!(input as ItemFn);

    match expand(&macro_args, &input_fn) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}
