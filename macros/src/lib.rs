extern crate proc_macro;
use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::{parse_macro_input, Data, DeriveInput, Fields};

// Generates `field()`, `set_field(v)` and `take_field()` for every named field.
// `take_` leaves `Default::default()` behind, so every field type must implement `Default`.
#[proc_macro_derive(Latches)]
pub fn derive_latches(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    let name = input.ident;
    let vis = input.vis;

    let fields = match input.data {
        Data::Struct(ds) => match ds.fields {
            Fields::Named(f) => f.named.into_iter(),
            _ => unimplemented!(),
        },
        _ => unimplemented!(),
    };

    let gen_funcs = |ident: syn::Ident, ty: syn::Type| {
        let set = format_ident!("set_{}", ident);
        let take = format_ident!("take_{}", ident);
        quote! {
            #vis fn #ident(&self) -> #ty {
                self.#ident.clone()
            }

            #vis fn #set(&mut self, v: #ty) {
                self.#ident = v;
            }

            #vis fn #take(&mut self) -> #ty {
                ::std::mem::take(&mut self.#ident)
            }
        }
    };

    let funcs = fields.map(|x| gen_funcs(x.ident.unwrap(), x.ty));

    let expand = quote! {
        impl #name {
            #(#funcs)*
        }
    };

    TokenStream::from(expand)
}
