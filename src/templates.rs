//! Sample HTML documents for testing and demonstration.
//!
//! Each template exercises a different part of the capture path.

/// Invoice-style document: an author stylesheet and many rows that share
/// one computed style.
pub fn invoice_template() -> &'static str {
    r##"
<!DOCTYPE html>
<html>
<head>
    <style>
        .invoice { padding: 24px; font-family: Helvetica, sans-serif }
        .invoice h1 { color: #1a365d; margin: 0px 0px 16px }
        .row td { padding: 8px; border-bottom: 1px solid #e2e8f0 }
        .total { text-align: right; font-weight: 700 }
    </style>
</head>
<body>
    <div class="invoice">
        <h1>Invoice #2024-001</h1>
        <table>
            <tr class="row"><td>Web Development</td><td>40</td><td>$6,000.00</td></tr>
            <tr class="row"><td>Design Services</td><td>20</td><td>$2,500.00</td></tr>
            <tr class="row"><td>Hosting (Annual)</td><td>1</td><td>$500.00</td></tr>
        </table>
        <p class="total">Total: $9,000.00</p>
    </div>
</body>
</html>
"##
}

/// Web components: one with a slot (light DOM projected) and one without
/// (shadow tree flattened).
pub fn component_template() -> &'static str {
    r##"
<body>
    <x-card>
        <template shadowrootmode="open">
            <style>.frame { border: 1px solid #ccc; padding: 8px }</style>
            <div class="frame"><slot name="title"></slot><slot></slot></div>
        </template>
        <h2 slot="title">Quarterly summary</h2>
        <p>Revenue grew in every region.</p>
    </x-card>
    <x-badge>
        <template shadowrootmode="open">
            <style>b { color: #2f855a }</style>
            <b>Approved</b>
        </template>
        <i>never rendered</i>
    </x-badge>
</body>
"##
}

/// Form controls whose live state must be copied.
pub fn form_template() -> &'static str {
    r##"
<body>
    <form>
        <label>Name <input id="name" type="text" value="Ada"></label>
        <label><input id="agree" type="checkbox"> I agree</label>
        <select id="plan">
            <option value="free" selected>Free</option>
            <option value="pro">Pro</option>
        </select>
        <textarea id="notes" style="width: 240px; height: 80px">First line</textarea>
    </form>
</body>
"##
}

/// Replaced and special content: responsive image, canvas, frames and the
/// capture marker attributes.
pub fn media_template() -> &'static str {
    r##"
<body>
    <img id="hero" src="hero-1x.png" srcset="hero-1x.png 1x, hero-2x.png 2x" width="320" height="180">
    <canvas id="chart" width="64" height="32"></canvas>
    <iframe id="video" src="https://player.example.net/embed/1" width="400" height="225"></iframe>
    <div id="map" data-capture="placeholder" data-placeholder-text="Map omitted" style="width: 300px; height: 200px">
        <span>interactive map</span>
    </div>
    <aside id="cookie" data-capture="exclude" style="width: 300px; height: 48px">Cookie banner</aside>
</body>
"##
}

/// Minimal template for unit testing.
pub fn minimal_template() -> &'static str {
    r#"<div><h1>Title</h1><p>Body text</p></div>"#
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn templates_are_valid_html() {
        let templates: Vec<(&str, &str)> = vec![
            ("invoice", invoice_template()),
            ("component", component_template()),
            ("form", form_template()),
            ("media", media_template()),
            ("minimal", minimal_template()),
        ];

        for (name, html) in templates {
            let dom = crate::dom::parse_html(html);
            assert!(
                !dom.is_empty(),
                "Template '{}' should parse to non-empty DOM",
                name
            );
        }
    }

    #[test]
    fn component_template_has_shadow_roots() {
        let dom = crate::dom::parse_html(component_template());
        for host in ["x-card", "x-badge"] {
            let node = dom.find_first(host).unwrap().unwrap();
            assert!(dom.shadow_root(node).is_some(), "{host} has no shadow root");
        }
    }
}
