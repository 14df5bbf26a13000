use proc_macro::TokenStream;
use quote::quote_spanned;
use syn::{
    ItemFn, LitInt, LitStr, Token,
    parse::{Parse, ParseStream},
    parse_macro_input,
    spanned::Spanned,
};

#[proc_macro_attribute]
pub fn assert_exit_code(attr: TokenStream, item: TokenStream) -> TokenStream {
    let code = parse_macro_input!(attr as LitInt);
    let mut input_fn = parse_macro_input!(item as ItemFn);
    let block = *input_fn.block;
    *input_fn.block = syn::parse_quote! {
        {
            fn _f() {}
            fn _get_name<T>(_: T) -> &'static str {
                let n = core::any::type_name::<T>();
                &n[..n.len() - 4]
            }
            assert_eq!(
                tickos::thread::ThreadBuilder::new(_get_name(_f))
                    .spawn(move || { #block })
                    .join(),
            #code);
        }
    };
    TokenStream::from(quote_spanned! { input_fn.span() =>
        #input_fn
    })
}

struct LogCount {
    needle: LitStr,
    count: LitInt,
}

impl Parse for LogCount {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let needle = input.parse()?;
        input.parse::<Token![,]>()?;
        let count = input.parse()?;
        Ok(Self { needle, count })
    }
}

#[proc_macro_attribute]
pub fn assert_log_count(attr: TokenStream, item: TokenStream) -> TokenStream {
    let LogCount { needle, count } = parse_macro_input!(attr as LogCount);
    let mut input_fn = parse_macro_input!(item as ItemFn);
    let block = *input_fn.block;
    *input_fn.block = syn::parse_quote! {
        {
            tickos::thread::Current::hook_console();
            let _return_val = (move || { #block })();
            if let Some(lines) = tickos::thread::Current::finish_hook() {
                assert_eq!(
                    lines.iter().filter(|line| line.contains(#needle)).count(),
                    #count,
                    "log lines containing {:?}: {:#?}",
                    #needle,
                    lines
                );
            } else {
                panic!("Console is not hooked.");
            }
            _return_val
        }
    };
    TokenStream::from(quote_spanned! { input_fn.span() =>
        #input_fn
    })
}
