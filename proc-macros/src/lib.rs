/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

#![crate_type = "proc-macro"]

use quote::quote;
use syn::parse_macro_input;
use syn::DeriveInput;

extern crate proc_macro;
use proc_macro::TokenStream;

/// Derives `AbstractDomain` for an enum whose variants each wrap exactly one
/// abstract domain.
///
/// The first variant provides `bottom()` and `top()`. Lattice operations are
/// applied arm-wise when both sides use the same variant. Mixing variants
/// goes to top for join-like operations and to bottom for meet-like ones.
/// Widening and narrowing are forwarded to the arm, so a variant carrying a
/// domain with infinite ascending chains keeps its termination guarantee.
#[proc_macro_derive(DisjointUnion)]
pub fn derive_disjoint_union(input: TokenStream) -> TokenStream {
    let code_item: DeriveInput = parse_macro_input!(input as DeriveInput);
    let data_enum = match code_item.data {
        syn::Data::Enum(data_enum) => data_enum,
        _ => panic!("#[derive(DisjointUnion)] must be applied to enums only."),
    };

    for variant in data_enum.variants.iter() {
        match &variant.fields {
            syn::Fields::Unnamed(fields) if fields.unnamed.len() == 1 => {}
            _ => panic!(
                "variant `{}` must wrap exactly one abstract domain.",
                variant.ident
            ),
        }
    }

    let variant_idents = data_enum
        .variants
        .iter()
        .map(|variant| &variant.ident)
        .collect::<Vec<_>>();

    let first_variant = match variant_idents.first() {
        Some(first) => *first,
        None => panic!("enum needs at least one variant."),
    };

    let enum_name = &code_item.ident;
    let (impl_generics, ty_generics, where_clause) = code_item.generics.split_for_impl();

    let expanded = quote! {
        impl #impl_generics ::aexec::datatype::AbstractDomain for #enum_name #ty_generics #where_clause {
            fn bottom() -> Self {
                #enum_name::#first_variant(::aexec::datatype::AbstractDomain::bottom())
            }

            fn top() -> Self {
                #enum_name::#first_variant(::aexec::datatype::AbstractDomain::top())
            }

            fn is_bottom(&self) -> bool {
                match self {
                    #( #enum_name::#variant_idents(dom) => dom.is_bottom(), )*
                }
            }

            fn is_top(&self) -> bool {
                match self {
                    #( #enum_name::#variant_idents(dom) => dom.is_top(), )*
                }
            }

            fn leq(&self, rhs: &Self) -> bool {
                if self.is_bottom() {
                    return true;
                }

                if rhs.is_bottom() {
                    return false;
                }

                if rhs.is_top() {
                    return true;
                }

                if self.is_top() {
                    return false;
                }

                match (self, rhs) {
                    #( (#enum_name::#variant_idents(ldom), #enum_name::#variant_idents(rdom)) => ldom.leq(rdom), )*
                    _ => false,
                }
            }

            fn join_with(&mut self, rhs: Self) {
                if rhs.is_bottom() {
                    return;
                }
                if self.is_bottom() {
                    *self = rhs;
                    return;
                }
                match (self, rhs) {
                    #( (#enum_name::#variant_idents(ldom), #enum_name::#variant_idents(rdom)) => ldom.join_with(rdom), )*
                    (s, _) => *s = <Self as ::aexec::datatype::AbstractDomain>::top(),
                }
            }

            fn meet_with(&mut self, rhs: Self) {
                if rhs.is_top() {
                    return;
                }
                if self.is_top() {
                    *self = rhs;
                    return;
                }
                match (self, rhs) {
                    #( (#enum_name::#variant_idents(ldom), #enum_name::#variant_idents(rdom)) => ldom.meet_with(rdom), )*
                    (s, _) => *s = <Self as ::aexec::datatype::AbstractDomain>::bottom(),
                }
            }

            fn widen_with(&mut self, rhs: Self) {
                if rhs.is_bottom() {
                    return;
                }
                if self.is_bottom() {
                    *self = rhs;
                    return;
                }
                match (self, rhs) {
                    #( (#enum_name::#variant_idents(ldom), #enum_name::#variant_idents(rdom)) => ldom.widen_with(rdom), )*
                    (s, _) => *s = <Self as ::aexec::datatype::AbstractDomain>::top(),
                }
            }

            fn narrow_with(&mut self, rhs: Self) {
                if self.is_bottom() {
                    return;
                }
                if rhs.is_bottom() {
                    *self = rhs;
                    return;
                }
                match (self, rhs) {
                    #( (#enum_name::#variant_idents(ldom), #enum_name::#variant_idents(rdom)) => ldom.narrow_with(rdom), )*
                    (s, r) => *s = r,
                }
            }
        }
    };

    TokenStream::from(expanded)
}
