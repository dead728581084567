use proc_macro::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Error, Fields, Ident, Result, Type, parse_macro_input};

/// Derive macro for configuration sections.
///
/// Generates a `Default` implementation from inline `#[default(...)]` field
/// attributes and, when any field carries the `#[positive]` marker, an inherent
/// `non_positive_fields()` method listing the marked fields whose value is not
/// strictly greater than zero (NaN included).
///
/// String fields accept string literals; the value is converted with `.into()`.
/// Fields marked `#[positive]` must convert losslessly into `f64`
/// (`f32`, `f64`, `u32`, `i32` and smaller integer types).
///
/// # Example
/// ```
/// use gravitas_macros::ConfigDefaults;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(ConfigDefaults, Serialize, Deserialize)]
/// #[serde(default)]
/// pub struct UnitsConfig {
///     #[default(1.0)]
///     #[positive]
///     pub length_scale: f64,
///
///     #[default(0.0)]
///     #[positive]
///     pub time_scale: f64,
///
///     #[default("solar")]
///     pub label: String,
/// }
///
/// let config = UnitsConfig::default();
/// assert_eq!(config.length_scale, 1.0);
/// assert_eq!(config.label, "solar");
/// assert_eq!(config.non_positive_fields(), vec!["time_scale"]);
/// ```
///
/// # Errors
///
/// Compilation fails when the derive is applied to anything other than a struct
/// with named fields, when a field lacks `#[default(...)]`, or when the default
/// attribute is empty or malformed.
#[proc_macro_derive(ConfigDefaults, attributes(default, positive))]
pub fn config_defaults(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match expand(input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

/// Everything the generated code needs to know about one field.
struct ConfigField {
    ident: Ident,
    default: proc_macro2::TokenStream,
    converts_into_string: bool,
    positive: bool,
}

fn expand(input: DeriveInput) -> Result<proc_macro2::TokenStream> {
    let fields = config_fields(&input)?;
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let initializers = fields.iter().map(|field| {
        let ident = &field.ident;
        let value = &field.default;
        if field.converts_into_string {
            quote! { #ident: ::std::convert::Into::into(#value) }
        } else {
            quote! { #ident: #value }
        }
    });

    let default_impl = quote! {
        #[automatically_derived]
        impl #impl_generics ::std::default::Default for #name #ty_generics #where_clause {
            fn default() -> Self {
                Self {
                    #(#initializers),*
                }
            }
        }
    };

    let positive: Vec<&ConfigField> = fields.iter().filter(|field| field.positive).collect();
    if positive.is_empty() {
        return Ok(default_impl);
    }

    let checks = positive.iter().map(|field| {
        let ident = &field.ident;
        let label = ident.to_string();
        quote! {
            let value: f64 = ::std::convert::Into::into(self.#ident);
            if !(value > 0.0) {
                fields.push(#label);
            }
        }
    });

    Ok(quote! {
        #default_impl

        #[automatically_derived]
        impl #impl_generics #name #ty_generics #where_clause {
            /// Names of `#[positive]` fields whose current value is not strictly positive.
            pub fn non_positive_fields(&self) -> ::std::vec::Vec<&'static str> {
                let mut fields = ::std::vec::Vec::new();
                #(#checks)*
                fields
            }
        }
    })
}

fn config_fields(input: &DeriveInput) -> Result<Vec<ConfigField>> {
    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            Fields::Unnamed(_) => {
                return Err(Error::new_spanned(
                    input,
                    "ConfigDefaults only supports structs with named fields",
                ));
            }
            Fields::Unit => {
                return Err(Error::new_spanned(
                    input,
                    "ConfigDefaults cannot be derived for unit structs",
                ));
            }
        },
        Data::Enum(_) | Data::Union(_) => {
            return Err(Error::new_spanned(
                input,
                "ConfigDefaults can only be derived for structs",
            ));
        }
    };

    fields
        .iter()
        .map(|field| {
            let ident = field
                .ident
                .clone()
                .ok_or_else(|| Error::new_spanned(field, "expected a named field"))?;
            Ok(ConfigField {
                default: default_value(field, &ident)?,
                converts_into_string: names_string(&field.ty),
                positive: field.attrs.iter().any(|attr| attr.path().is_ident("positive")),
                ident,
            })
        })
        .collect()
}

fn names_string(ty: &Type) -> bool {
    match ty {
        Type::Path(path) => path
            .path
            .segments
            .last()
            .is_some_and(|segment| segment.ident == "String"),
        _ => false,
    }
}

fn default_value(field: &syn::Field, ident: &Ident) -> Result<proc_macro2::TokenStream> {
    let Some(attr) = field.attrs.iter().find(|attr| attr.path().is_ident("default")) else {
        return Err(Error::new_spanned(
            field,
            format!("field '{ident}' needs a #[default(...)] attribute"),
        ));
    };

    let tokens: proc_macro2::TokenStream = attr.parse_args().map_err(|e| {
        Error::new_spanned(attr, format!("malformed #[default] on field '{ident}': {e}"))
    })?;

    if tokens.is_empty() {
        return Err(Error::new_spanned(
            attr,
            format!("field '{ident}' has an empty #[default()]"),
        ));
    }

    Ok(tokens)
}
