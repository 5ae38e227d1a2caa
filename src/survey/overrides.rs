//! Distributions whose primary module is not their name with `-` -> `::`

/// (distribution, primary module)
const PRIMARY_MODULE_OVERRIDES: &[(&str, &str)] = &[
    ("ack", "App::Ack"),
    ("CGI.pm", "CGI"),
    ("IO-Compress", "IO::Compress::Base"),
    ("IO-stringy", "IO::Stringy"),
    ("libapreq2", "Apache2::Request"),
    ("libnet", "Net::Cmd"),
    ("libwww-perl", "LWP"),
    ("libxml-perl", "XML::Parser::PerlSAX"),
    ("MailTools", "Mail::Internet"),
    ("PathTools", "File::Spec"),
    ("perl-ldap", "Net::LDAP"),
    ("PerlMagick", "Image::Magick"),
    ("podlators", "Pod::Man"),
    ("Scalar-List-Utils", "List::Util"),
    ("Template-Toolkit", "Template"),
    ("TermReadKey", "Term::ReadKey"),
    ("Text-Tabs+Wrap", "Text::Wrap"),
    ("TimeDate", "Date::Parse"),
    ("YAML-LibYAML", "YAML::XS"),
];

/// Module whose install log entry identifies a distribution
pub fn primary_module_name(distribution: &str) -> String {
    PRIMARY_MODULE_OVERRIDES
        .iter()
        .find(|(dist, _)| *dist == distribution)
        .map(|(_, module)| module.to_string())
        .unwrap_or_else(|| distribution.replace('-', "::"))
}
