extern crate proc_macro;

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Fields, GenericArgument, LitInt, PathArguments, Type};

/// Derives `netlink::wire::NlaSet` for a struct of `Option<T>` fields, each
/// tagged `#[nla(N)]` with its attribute type id. Encode order follows field
/// declaration order; decode is a single pass over the TLV stream dispatching
/// on the recognized ids. A field literally named `extra` (of type
/// `Vec<(u16, Vec<u8>)>`) is special-cased rather than requiring `#[nla(N)]`:
/// it collects every attribute id the struct doesn't otherwise declare, as
/// raw `(kind, payload)` pairs, and re-emits them verbatim on encode — this
/// is what lets a schema that only names a handful of attributes still
/// round-trip a message carrying ones it doesn't know about.
///
/// This is the same "iterate the members, generate one match arm per member"
/// shape as a by-hand implementation would use, just generated once instead
/// of once per schema.
#[proc_macro_derive(NlaSet, attributes(nla))]
pub fn derive_nla_set(input: TokenStream) -> TokenStream {
    let parsed: DeriveInput = parse_macro_input!(input);
    let name = parsed.ident;

    let fields = match parsed.data {
        Data::Struct(s) => match s.fields {
            Fields::Named(named) => named.named,
            _ => panic!("NlaSet only supports structs with named fields"),
        },
        _ => panic!("NlaSet only supports structs"),
    };

    let mut encode_arms = Vec::new();
    let mut decode_arms = Vec::new();
    let mut has_extra = false;

    for field in fields.iter() {
        let field_ident = field.ident.clone().expect("named field");

        if field_ident == "extra" {
            has_extra = true;
            continue;
        }

        let nla_id = field
            .attrs
            .iter()
            .find(|a| a.path().is_ident("nla"))
            .map(|a| a.parse_args::<LitInt>().expect("#[nla(N)] expects an integer"))
            .unwrap_or_else(|| panic!("field `{field_ident}` is missing #[nla(N)]"));

        let inner_ty = option_inner_type(&field.ty)
            .unwrap_or_else(|| panic!("field `{field_ident}` must be `Option<T>`"));

        encode_arms.push(quote! {
            if let Some(ref v) = self.#field_ident {
                let mut payload = Vec::new();
                crate::netlink::wire::NlaValue::encode_nla_value(v, &mut payload);
                crate::netlink::wire::encode_nla(#nla_id, &payload, buf);
            }
        });

        decode_arms.push(quote! {
            #nla_id => {
                if let Ok(v) = <#inner_ty as crate::netlink::wire::NlaValue>::decode_nla_value(nla.payload) {
                    out.#field_ident = Some(v);
                }
            }
        });
    }

    let catch_all = if has_extra {
        quote! { kind => out.extra.push((kind, nla.payload.to_vec())), }
    } else {
        quote! { _ => {} }
    };

    let extra_encode = if has_extra {
        quote! {
            for (kind, payload) in &self.extra {
                crate::netlink::wire::encode_nla(*kind, payload, buf);
            }
        }
    } else {
        quote! {}
    };

    let expanded = quote! {
        impl crate::netlink::wire::NlaSet for #name {
            fn encode_attrs(&self, buf: &mut Vec<u8>) {
                #(#encode_arms)*
                #extra_encode
            }

            fn decode_attrs(raw: &[u8]) -> Self {
                let mut out = Self::default();
                for nla in crate::netlink::wire::NlaIter::new(raw) {
                    match nla.kind {
                        #(#decode_arms)*
                        #catch_all
                    }
                }
                out
            }
        }
    };

    TokenStream::from(expanded)
}

fn option_inner_type(ty: &Type) -> Option<&Type> {
    let Type::Path(type_path) = ty else { return None };
    let segment = type_path.path.segments.last()?;
    if segment.ident != "Option" {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &segment.arguments else { return None };
    args.args.iter().find_map(|a| match a {
        GenericArgument::Type(t) => Some(t),
        _ => None,
    })
}
